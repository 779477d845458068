fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure().build_server(false).compile_protos(
        &["proto/user_service.proto"],
        &["proto"],
    )?;
    tonic_build::configure()
        .build_client(false)
        .compile_protos(&["proto/file_service.proto"], &["proto"])?;
    Ok(())
}
