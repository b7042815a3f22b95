use gar_core::{drain_all, drain_to_vec, DrainOptions};
use gar_tre::{
    error::{Error, Result},
    write::TreWriterOptions,
    CompressionMethod, TreArchive, TreWriter,
};
use pretty_assertions::assert_eq;
use std::{
    fs::{self, File},
    io::{Cursor, Write},
    path::Path,
};
use tracing::info;
use tracing_test::traced_test;

fn contents() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("appearance/mesh/box.msh", (0..5000u32).map(|i| (i % 251) as u8).collect()),
        ("string/en/ui.stf", b"UI strings".to_vec()),
        ("empty.iff", Vec::new()),
        ("texture/noise.dds", (0..3000u32).map(|i| (i * 7919 % 256) as u8).collect()),
    ]
}

fn write_archive(path: &Path, options: TreWriterOptions, compression: CompressionMethod) -> Result<()> {
    let mut writer = TreWriter::new(Cursor::new(Vec::new()), options);
    for (name, data) in contents() {
        writer.start_file(name, compression)?;
        writer.write_all(&data)?;
    }
    fs::write(path, writer.finish()?.into_inner())?;
    Ok(())
}

#[traced_test]
#[test]
fn merge_preserves_content() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let source_path = dir.path().join("source.tre");
    write_archive(
        &source_path,
        TreWriterOptions::builder()
            .record_compression(CompressionMethod::None)
            .name_compression(CompressionMethod::None)
            .build(),
        CompressionMethod::None,
    )?;

    let source = TreArchive::open(&source_path)?;
    info!("merging {} files", source.len());

    let mut writer = TreWriter::new(Cursor::new(Vec::new()), TreWriterOptions::builder().build());
    for resource in source.resources() {
        writer.add_resource(resource, CompressionMethod::Zlib)?;
    }
    let merged_path = dir.path().join("merged.tre");
    fs::write(&merged_path, writer.finish()?.into_inner())?;

    let merged = TreArchive::open(&merged_path)?;
    assert!(merged.rejected().is_empty());
    assert!(!merged.by_name("appearance/mesh/box.msh")?.is_stored());
    assert!(merged.by_name("string/en/ui.stf")?.is_stored());
    assert_eq!(
        source.file_names().collect::<Vec<_>>(),
        merged.file_names().collect::<Vec<_>>()
    );
    assert_eq!(source.decompressed_size(), merged.decompressed_size());

    for (original, copy) in source.resources().zip(merged.resources()) {
        assert_eq!(original.property("crc32"), copy.property("crc32"));
        assert_eq!(drain_to_vec(original)?, drain_to_vec(copy)?);
    }
    Ok(())
}

#[traced_test]
#[test]
fn extract_every_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let archive_path = dir.path().join("data.tre");
    write_archive(&archive_path, TreWriterOptions::builder().build(), CompressionMethod::Zlib)?;

    let archive = TreArchive::open(&archive_path)?;
    let out = dir.path().join("out");
    let report = drain_all(archive.resources(), DrainOptions::default(), |_, resource| {
        let path = out.join(resource.name());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(File::create(path)?)
    });

    assert!(report.is_success());
    assert_eq!(report.completed.len(), 4);
    for (name, data) in contents() {
        assert_eq!(fs::read(out.join(name))?, data);
    }
    assert!(logs_contain("batch finished"));
    Ok(())
}

#[test]
fn garbage_is_not_an_archive() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("garbage.tre");
    fs::write(&path, b"this is not a tre archive at all, just text")?;

    assert!(matches!(TreArchive::open(&path), Err(Error::InvalidArchive)));
    Ok(())
}
