use std::io::{Read, Write};
use std::sync::Arc;

use anyhow::Result;
use npy_points::io::compression::{CompressionCodec, decompress_all, detect_codec, register_codec};
use npy_points::testing::NpyFileBuilder;
use npy_points::*;

/// XORs every byte with a fixed key; enough to prove custom codecs are honoured.
struct XorCodec;

struct XorReader(Box<dyn Read>);

impl Read for XorReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.0.read(buf)?;
        buf[..n].iter_mut().for_each(|b| *b ^= 0x5a);
        Ok(n)
    }
}

struct XorWriter(Box<dyn Write>);

impl Write for XorWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let masked: Vec<u8> = buf.iter().map(|b| b ^ 0x5a).collect();
        self.0.write_all(&masked)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.flush()
    }
}

impl CompressionCodec for XorCodec {
    fn name(&self) -> &str {
        "xor"
    }

    fn extensions(&self) -> &[&str] {
        &[".xor"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        None
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        Ok(Box::new(XorReader(reader)))
    }

    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn Write>> {
        Ok(Box::new(XorWriter(writer)))
    }
}

#[test]
fn registered_codecs_are_used_for_loading() -> Result<()> {
    register_codec(Arc::new(XorCodec));
    let tmp = tempfile::tempdir()?;
    let path = NpyFileBuilder::new()
        .field("X", "<f8")
        .row(&[4.5])
        .row(&[9.0])
        .write(tmp.path().join("masked.npy.xor"))?;

    let array = FormatLoader::default().load(&path)?;

    assert!(!array.is_mapped());
    assert_eq!(array.shape(), &[2]);
    assert_eq!(&array.payload()[8..], &9.0f64.to_le_bytes());
    Ok(())
}

#[test]
fn decompress_all_round_trips_through_a_codec() -> Result<()> {
    register_codec(Arc::new(XorCodec));
    let codec = detect_codec("data.xor", b"").expect("xor codec registered");
    let masked: Vec<u8> = b"\x93NUMPY".iter().map(|b| b ^ 0x5a).collect();

    let plain = decompress_all(codec.as_ref(), std::io::Cursor::new(masked))?;

    assert_eq!(plain, b"\x93NUMPY");
    Ok(())
}

#[cfg(feature = "compression-gzip")]
#[test]
fn gzip_magic_wins_over_a_plain_extension() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let packed = NpyFileBuilder::new()
        .field("Intensity", "<u2")
        .row(&[12.0])
        .write(tmp.path().join("packed.npy.gz"))?;
    let disguised = tmp.path().join("disguised.npy");
    std::fs::rename(&packed, &disguised)?;

    let array = FormatLoader::default().load(&disguised)?;

    assert_eq!(array.payload(), &12u16.to_le_bytes());
    Ok(())
}
