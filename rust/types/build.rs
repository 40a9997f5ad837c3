fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Compile the raft key-value service definition into client and server stubs.
    let proto_paths = ["idl/raftapi/raftkv.proto"];
    for path in proto_paths.iter() {
        println!("cargo:rerun-if-changed={path}");
    }

    tonic_prost_build::configure().compile_protos(&proto_paths, &["idl/"])?;

    Ok(())
}
