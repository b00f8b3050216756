//! Spectral helpers: window functions, scope FFT, single-bin DFT.

pub mod fft;
pub mod window;

pub use fft::{DEFAULT_FFT_LEN, Spectrum, dft_at, fft_spectrum};
pub use window::WindowFunction;
