//! Generated gRPC types and service stubs for the `registry.v1.Registry`
//! service. Regenerated from `proto/registry.proto` by `tonic-build` on every
//! build; nothing under this crate is meant to be hand-edited.

pub mod v1 {
    tonic::include_proto!("registry.v1");
}

pub mod convert;

/// The encoded `FileDescriptorSet` for `registry.v1`, used to serve gRPC
/// server reflection.
pub const FILE_DESCRIPTOR_SET: &[u8] =
    include_bytes!(concat!(env!("OUT_DIR"), "/registry_descriptor.bin"));
