use std::io::Write;

use crate::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Big-endian primitive writes over any [`Write`] sink.
#[derive(Debug)]
pub struct WriteAdaptor<W: Write> {
    writer: W,
}

impl<W: Write> WriteAdaptor<W> {
    pub fn new(w: W) -> Self {
        Self { writer: w }
    }
}

impl<W: Write> WriteAdaptor<W> {
    pub fn write_u8_be(&mut self, value: u8) -> Result<()> {
        let buf = value.to_be_bytes();
        self.writer.write_all(&buf).map_err(Error::Incomplete)?;
        Ok(())
    }

    pub fn write_i8_be(&mut self, value: i8) -> Result<()> {
        let buf = value.to_be_bytes();
        self.writer.write_all(&buf).map_err(Error::Incomplete)?;
        Ok(())
    }

    pub fn write_u16_be(&mut self, value: u16) -> Result<()> {
        let buf = value.to_be_bytes();
        self.writer.write_all(&buf).map_err(Error::Incomplete)?;
        Ok(())
    }

    pub fn write_i16_be(&mut self, value: i16) -> Result<()> {
        let buf = value.to_be_bytes();
        self.writer.write_all(&buf).map_err(Error::Incomplete)?;
        Ok(())
    }

    pub fn write_i32_be(&mut self, value: i32) -> Result<()> {
        let buf = value.to_be_bytes();
        self.writer.write_all(&buf).map_err(Error::Incomplete)?;
        Ok(())
    }

    pub fn write_i64_be(&mut self, value: i64) -> Result<()> {
        let buf = value.to_be_bytes();
        self.writer.write_all(&buf).map_err(Error::Incomplete)?;
        Ok(())
    }

    pub fn write_f32_be(&mut self, value: f32) -> Result<()> {
        let buf = value.to_be_bytes();
        self.writer.write_all(&buf).map_err(Error::Incomplete)?;
        Ok(())
    }

    pub fn write_f64_be(&mut self, value: f64) -> Result<()> {
        let buf = value.to_be_bytes();
        self.writer.write_all(&buf).map_err(Error::Incomplete)?;
        Ok(())
    }

    pub fn write_slice(&mut self, value: &[u8]) -> Result<()> {
        self.writer.write_all(value).map_err(Error::Incomplete)?;
        Ok(())
    }
}
