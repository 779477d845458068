//! Generated gRPC stubs, built by `build.rs` from `proto/*.proto`.

pub mod file {
    tonic::include_proto!("todennus.file");
}

pub mod user {
    tonic::include_proto!("todennus.user");
}
