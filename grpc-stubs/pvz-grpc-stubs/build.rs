fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=../../proto/pvz/v1/pvz.proto");
    println!("cargo:rerun-if-changed=../../proto");

    tonic_prost_build::configure()
        .build_client(true)
        .build_server(true)
        .compile_protos(&["../../proto/pvz/v1/pvz.proto"], &["../../proto"])?;

    Ok(())
}
