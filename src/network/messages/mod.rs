pub mod conversions;

pub mod chord {
    tonic::include_proto!("chord");
}
