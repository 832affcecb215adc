//! Virtual-time utilities: [`sleep`] and the native deadline scope
//! [`timeout`].

mod sleep;
mod timeout;

pub use sleep::{sleep, Sleep};
pub use timeout::{timeout, Timeout};
