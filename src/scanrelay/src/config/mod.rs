mod config_loader;
mod defaults;

pub use config_loader::{Config, ConfigLoader};
pub use defaults::default_data_dir;
