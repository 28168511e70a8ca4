//! CLI command implementations.

pub(crate) mod config;
pub(crate) mod convert;
pub(crate) mod plugins;

pub(crate) use config::ConfigArgs;
pub(crate) use convert::ConvertArgs;
pub(crate) use plugins::PluginsArgs;
