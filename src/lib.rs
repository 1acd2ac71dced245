//! JDC - Plugin and hook dispatch runtime for a Java development assistant CLI

pub mod assistant;
pub mod config;
pub mod error;
pub mod hooks;
pub mod modules;
pub mod monitor;
pub mod plugins;

pub use config::Config;
pub use error::{JdcError, Result};
