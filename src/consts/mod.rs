mod const_register;

pub mod sdio;
