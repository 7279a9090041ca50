fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use a system protoc when one is configured, otherwise the vendored one
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile(
            &["../../proto/prices.proto"],
            &["../../proto"],
        )?;

    println!("cargo:rerun-if-changed=../../proto/prices.proto");
    Ok(())
}
