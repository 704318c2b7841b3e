// Library exports for ctxedit

pub mod config;
pub mod richtext;
