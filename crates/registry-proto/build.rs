fn main() -> Result<(), Box<dyn std::error::Error>> {
    let out_dir = std::env::var("OUT_DIR")?;

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .file_descriptor_set_path(std::path::Path::new(&out_dir).join("registry_descriptor.bin"))
        // The cache's File backend stores these messages as canonical JSON,
        // one record per file, so they need to round-trip through serde too.
        .type_attribute(".", "#[derive(serde::Serialize, serde::Deserialize)]")
        .compile(&["proto/registry.proto"], &["proto"])?;

    Ok(())
}
