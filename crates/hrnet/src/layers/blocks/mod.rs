//! # Conv Blocks
//!
//! * [`cna`] - ``Conv2d + Norm + Act`` block.
//! * [`conv_norm`] - ``Conv2d + Norm`` block.

use burn::nn::PaddingConfig2d;
use burn::nn::conv::Conv2dConfig;

pub mod cna;
pub mod conv_norm;

/// Build a bias-free square [`Conv2dConfig`] with "same-style" padding.
///
/// Padding is ``kernel_size / 2``; so for odd kernels the output
/// resolution is ``input / stride`` for inputs divisible by the stride.
pub fn square_conv2d_config(
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    stride: usize,
) -> Conv2dConfig {
    let padding = kernel_size / 2;
    Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(padding, padding))
        .with_bias(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square_conv2d_config() {
        let config = square_conv2d_config(2, 4, 3, 2);
        assert_eq!(config.channels, [2, 4]);
        assert_eq!(config.kernel_size, [3, 3]);
        assert_eq!(config.stride, [2, 2]);
        assert!(matches!(config.padding, PaddingConfig2d::Explicit(1, 1)));
        assert!(!config.bias);

        let config = square_conv2d_config(4, 8, 1, 1);
        assert!(matches!(config.padding, PaddingConfig2d::Explicit(0, 0)));
    }
}
