//! Local session state: the persisted session file and the device identity.

mod device;
mod store;

pub use device::DeviceIdentity;
pub(crate) use store::atomic_write_private;
pub use store::SessionStore;
