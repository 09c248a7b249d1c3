#![no_std]

pub mod bus;
pub mod irq;
pub mod registers;
pub mod sdio;
pub mod settings;

pub use bus::SdioBus;
pub use irq::IrqLock;
pub use registers::Chip;
pub use sdio::Error;
pub use sdio::InitError;
pub use sdio::WilcSdio;
