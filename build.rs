fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Fall back to the vendored compiler when the host has no protoc on PATH
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(
            &["src/network/messages/chord.proto"],
            &["src/network/messages/"],
        )?;
    Ok(())
}
