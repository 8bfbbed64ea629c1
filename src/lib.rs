pub mod logging;
pub mod pipeline;
pub mod settings;
