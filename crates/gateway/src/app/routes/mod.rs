pub mod forward;
pub mod session;
pub mod system;
