//! Concrete container formats and the external tools behind them.

pub mod apk;
pub mod tar;
pub mod zip;

pub use apk::{ApkPacker, ApkUnpacker};
pub use tar::{TarPacker, TarUnpacker};
