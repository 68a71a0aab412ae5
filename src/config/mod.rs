//! Server options: the flat set of named settings the composition phases read.

mod options;

pub use options::{
    AuthenticationOptions, CorsOptions, DeviceFlowOptions, EndpointsOptions, EventsOptions,
    ServerOptions, UserInteractionOptions,
};
