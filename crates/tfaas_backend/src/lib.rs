pub mod config;
pub mod router;

pub use router::{
    ingress_router,
    management_router,
    IngressState,
    ManagementState,
};

pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
