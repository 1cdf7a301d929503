//! Protocol types and service stubs generated from `proto/provider.proto`.

tonic::include_proto!("hemmer.provider.v1");
