use std::fs;

use anyhow::Result;
use npy_points::testing::NpyFileBuilder;
use npy_points::*;

fn simple() -> NpyFileBuilder {
    NpyFileBuilder::new()
        .field("X", "<f8")
        .field("Intensity", "<u2")
        .row(&[1.0, 2.0])
        .row(&[3.0, 4.0])
        .row(&[5.0, 6.0])
}

#[test]
fn loads_header_and_maps_payload() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = simple().write(tmp.path().join("simple.npy"))?;

    let array = FormatLoader::default().load(&path)?;

    assert!(array.is_mapped());
    assert_eq!(array.shape(), &[3]);
    assert_eq!(array.rank(), 1);
    assert_eq!(array.len(), 3);
    assert_eq!(array.itemsize(), 10);
    assert_eq!(array.payload().len(), 30);
    assert_eq!(array.header().version, (1, 0));
    assert!(!array.header().fortran_order);
    assert_eq!(array.header().data_offset % 64, 0);
    assert_eq!(&array.payload()[10..18], &3.0f64.to_le_bytes());
    Ok(())
}

#[test]
fn versions_two_and_three_are_accepted() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    for version in [2u8, 3] {
        let path = simple()
            .version(version)
            .write(tmp.path().join(format!("v{version}.npy")))?;

        let array = FormatLoader::default().load(&path)?;

        assert_eq!(array.header().version, (version, 0));
        assert_eq!(array.shape(), &[3]);
    }
    Ok(())
}

#[test]
fn unicode_field_names_need_version_three() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let builder = NpyFileBuilder::new().field("Höhe", "<f4").row(&[1.0]);

    let v3 = builder.clone().version(3).write(tmp.path().join("v3.npy"))?;
    let array = FormatLoader::default().load(&v3)?;
    assert_eq!(array.fields()[0].name, "Höhe");

    let v1 = builder.version(1).write(tmp.path().join("v1.npy"))?;
    let err = FormatLoader::default().load(&v1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);
    assert!(err.to_string().contains("ASCII"));
    Ok(())
}

#[test]
fn in_memory_loading_when_mmap_is_off() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = simple().write(tmp.path().join("owned.npy"))?;
    let loader = FormatLoader::new(LoaderConfig {
        mmap: false,
        ..LoaderConfig::default()
    });

    let array = loader.load(&path)?;

    assert!(!array.is_mapped());
    assert_eq!(array.payload().len(), 30);
    Ok(())
}

#[test]
fn bad_magic_is_a_format_error() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = simple().magic(b"\x93NUMPX").write(tmp.path().join("magic.npy"))?;

    let err = FormatLoader::default().load(&path).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Format);
    assert!(err.to_string().contains("magic.npy"));
    Ok(())
}

#[test]
fn tiny_and_empty_files_are_format_errors() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let empty = tmp.path().join("empty.npy");
    fs::write(&empty, b"")?;
    let short = tmp.path().join("short.npy");
    fs::write(&short, b"\x93NUMPY\x01")?;

    for path in [empty, short] {
        let err = FormatLoader::default().load(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format, "{}", path.display());
    }
    Ok(())
}

#[test]
fn unknown_version_is_rejected() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = simple().version(4).write(tmp.path().join("v4.npy"))?;

    let err = FormatLoader::default().load(&path).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Format);
    assert!(err.to_string().contains("version 4"));
    Ok(())
}

#[test]
fn truncated_payload_is_rejected() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = simple().truncate(1).write(tmp.path().join("cut.npy"))?;

    let err = FormatLoader::default().load(&path).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Format);
    assert!(err.to_string().contains("truncated"));
    Ok(())
}

#[test]
fn plain_arrays_are_not_structured() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = NpyFileBuilder::new()
        .descr("'<f8'")
        .shape(&[2])
        .raw_payload(&[0; 16])
        .write(tmp.path().join("plain.npy"))?;

    let err = FormatLoader::default().load(&path).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Format);
    assert!(err.to_string().contains("not a structured array"), "{err}");
    Ok(())
}

#[test]
fn oversized_header_is_rejected() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = simple().write(tmp.path().join("long.npy"))?;
    let loader = FormatLoader::new(LoaderConfig {
        max_header_len: 16,
        ..LoaderConfig::default()
    });

    let err = loader.load(&path).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Format);
    assert!(err.to_string().contains("limit is 16"));
    Ok(())
}

#[cfg(target_pointer_width = "64")]
#[test]
fn oversized_subarray_is_a_format_error() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = NpyFileBuilder::new()
        .descr("[('X', '<f8'), ('V', '<f4', (4611686018427387904,))]")
        .shape(&[1])
        .raw_payload(&[0; 16])
        .write(tmp.path().join("huge_field.npy"))?;

    let err = FormatLoader::default().load(&path).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Format);
    assert!(err.to_string().contains("overflows"), "{err}");
    Ok(())
}

#[cfg(target_pointer_width = "64")]
#[test]
fn oversized_shape_is_a_format_error() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = NpyFileBuilder::new()
        .field("X", "<f8")
        .shape(&[1 << 32, 1 << 32, 2])
        .raw_payload(&[0; 16])
        .write(tmp.path().join("huge_shape.npy"))?;

    let err = FormatLoader::default().load(&path).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Format);
    assert!(err.to_string().contains("overflows"), "{err}");
    Ok(())
}

#[test]
fn malformed_typestrings_are_format_errors() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    for typestr in ["<f8garbage", "<i4]"] {
        let path = NpyFileBuilder::new()
            .descr(format!("[('X', '{typestr}')]"))
            .shape(&[1])
            .raw_payload(&[0; 8])
            .write(tmp.path().join("typestr.npy"))?;

        let err = FormatLoader::default().load(&path).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Format);
        assert!(err.to_string().contains("malformed typestr"), "{err}");
    }
    Ok(())
}

#[test]
fn titled_field_names_use_the_name_part() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = NpyFileBuilder::new()
        .descr("[(('Easting in metres', 'X'), '<f8')]")
        .shape(&[1])
        .raw_payload(&1.0f64.to_le_bytes())
        .write(tmp.path().join("titled.npy"))?;

    let array = FormatLoader::default().load(&path)?;

    assert_eq!(array.fields()[0].name, "X");
    Ok(())
}

#[cfg(feature = "compression-gzip")]
#[test]
fn gzip_inputs_are_decompressed() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = simple().write(tmp.path().join("simple.npy.gz"))?;

    let array = FormatLoader::default().load(&path)?;
    assert!(!array.is_mapped());
    assert_eq!(array.shape(), &[3]);

    let raw = FormatLoader::new(LoaderConfig {
        decompress: false,
        ..LoaderConfig::default()
    });
    assert_eq!(raw.load(&path).unwrap_err().kind(), ErrorKind::Format);
    Ok(())
}

#[cfg(feature = "compression-zstd")]
#[test]
fn zstd_is_detected_by_content() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let packed = simple().write(tmp.path().join("simple.npy.zst"))?;
    let renamed = tmp.path().join("renamed.npy");
    fs::rename(&packed, &renamed)?;

    let array = FormatLoader::default().load(&renamed)?;

    assert_eq!(array.payload().len(), 30);
    Ok(())
}
