pub mod clear;
pub mod install;
pub mod prune;
pub mod rotate;
pub mod status;
pub mod uninstall;

pub use clear::run_clear;
pub use install::run_install;
pub use prune::run_prune;
pub use rotate::run_rotate;
pub use status::run_status;
pub use uninstall::run_uninstall;
