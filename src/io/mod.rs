pub mod compression;
pub mod npy;
