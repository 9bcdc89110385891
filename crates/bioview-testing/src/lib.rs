//! Testing utilities and harness for bioview

pub mod service;
pub mod testing;

pub use service::*;
pub use testing::*;

pub mod prelude {
    pub use crate::service::*;
    pub use crate::testing::*;
}
