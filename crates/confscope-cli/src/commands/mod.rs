pub mod common;
pub mod modprobe;
pub mod pam;
pub mod settings;
pub mod sshd;
pub mod sudoers;

pub use common::Context;
pub use modprobe::Modprobe;
pub use pam::Pam;
pub use settings::Settings;
pub use sshd::Sshd;
pub use sudoers::Sudoers;
