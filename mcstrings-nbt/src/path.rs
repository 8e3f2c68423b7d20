//! Paths addressing single tags inside a tag tree.
//!
//! A path is a `/`-separated list of components. Each component names a key
//! of a compound tag and may carry a list index, so `block_entities[0]/Text1`
//! selects the `Text1` tag of the first element of the `block_entities` list.

use std::fmt;

use thiserror::Error;

use crate::compound::NbtCompound;
use crate::tag::NbtTag;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PathError {
    #[error("cannot parse nbt_path")]
    Malformed,
    #[error("{0} is not a TAG_Compound")]
    NotCompound(String),
    #[error("cannot find {0}")]
    MissingKey(String),
    #[error("{0} is not a TAG_List")]
    NotList(String),
    #[error("index {index} out of bounds; {path} has length {len}")]
    IndexOutOfRange {
        index: usize,
        path: String,
        len: usize,
    },
    #[error("{0} is not a TAG_String")]
    NotString(String),
}

/// The result of assigning a string through a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// The tag already held the new value; the tree was not touched.
    Unchanged,
    /// The tag held a different value and was overwritten.
    Replaced,
}

/// One path component: a compound key, optionally followed by a list index
/// (`NAME` or `NAME[INDEX]`).
#[derive(Debug, Clone, PartialEq, Eq)]
struct PathComponent {
    name: String,
    index: Option<usize>,
}

impl fmt::Display for PathComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "{}[{}]", self.name, index),
            None => f.write_str(&self.name),
        }
    }
}

impl PathComponent {
    /// Parses `NAME` or `NAME[INDEX]` where `NAME` is nonempty and contains
    /// neither `/` nor `[`, and `INDEX` is a run of decimal digits.
    fn parse(part: &str) -> Option<PathComponent> {
        match part.find('[') {
            None => {
                if part.is_empty() {
                    return None;
                }
                Some(PathComponent {
                    name: part.to_string(),
                    index: None,
                })
            }
            Some(0) => None,
            Some(open) => {
                let digits = part[open..].strip_prefix('[')?.strip_suffix(']')?;
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                Some(PathComponent {
                    name: part[..open].to_string(),
                    index: Some(digits.parse().ok()?),
                })
            }
        }
    }
}

/// A parsed path through a tag tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagPath {
    components: Vec<PathComponent>,
}

impl fmt::Display for TagPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, component) in self.components.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{component}")?;
        }
        Ok(())
    }
}

impl TagPath {
    pub fn parse(path: &str) -> Result<TagPath, PathError> {
        let components = path
            .split('/')
            .map(PathComponent::parse)
            .collect::<Option<Vec<_>>>()
            .ok_or(PathError::Malformed)?;
        Ok(TagPath { components })
    }

    /// The path text up to (excluding) component `end`.
    fn prefix(&self, end: usize) -> String {
        self.components[..end]
            .iter()
            .map(PathComponent::to_string)
            .collect::<Vec<_>>()
            .join("/")
    }

    /// The path text up to component `at`, ending in that component's bare
    /// name (without its list index). Used for messages about the key itself.
    fn named_prefix(&self, at: usize) -> String {
        self.components[..at]
            .iter()
            .map(PathComponent::to_string)
            .chain([self.components[at].name.clone()])
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Resolves one component against a compound, yielding the tag it selects.
    fn step<'a>(
        &self,
        compound: &'a mut NbtCompound,
        at: usize,
    ) -> Result<&'a mut NbtTag, PathError> {
        let component = &self.components[at];
        let tag = compound
            .get_mut(&component.name)
            .ok_or_else(|| PathError::MissingKey(self.named_prefix(at)))?;
        let Some(index) = component.index else {
            return Ok(tag);
        };
        let NbtTag::List(items) = tag else {
            return Err(PathError::NotList(self.named_prefix(at)));
        };
        let len = items.len();
        items
            .get_mut(index)
            .ok_or_else(|| PathError::IndexOutOfRange {
                index,
                path: self.named_prefix(at),
                len,
            })
    }

    /// Replaces the string tag this path selects with `value`.
    ///
    /// The tree is only modified when the selected tag is a string holding a
    /// different value. No keys are created, no lists are resized, and no tag
    /// ever changes kind; any resolution failure leaves the tree untouched.
    pub fn assign_string(
        &self,
        root: &mut NbtCompound,
        value: &str,
    ) -> Result<SetOutcome, PathError> {
        let mut node = self.step(root, 0)?;
        for at in 1..self.components.len() {
            let NbtTag::Compound(compound) = node else {
                return Err(PathError::NotCompound(self.prefix(at)));
            };
            node = self.step(compound, at)?;
        }
        let NbtTag::String(old) = node else {
            return Err(PathError::NotString(self.to_string()));
        };
        if *old == value {
            return Ok(SetOutcome::Unchanged);
        }
        *old = value.to_string();
        Ok(SetOutcome::Replaced)
    }
}
