//! # HRNet Utilities
use bimm_contracts::unpack_shape_contract;

/// The channel width of a branch.
///
/// Branch `i` has ``base_channels * 2^i`` channels.
#[inline(always)]
pub fn branch_channels(
    base_channels: usize,
    branch: usize,
) -> usize {
    base_channels << branch
}

/// The channel widths of the first `num_branches` branches.
pub fn branch_channels_list(
    base_channels: usize,
    num_branches: usize,
) -> Vec<usize> {
    (0..num_branches)
        .map(|branch| branch_channels(base_channels, branch))
        .collect()
}

/// The spatial reduction of a branch, relative to branch 0.
///
/// Branch `i` runs at ``1 / 2^i`` of the branch 0 resolution.
#[inline(always)]
pub fn branch_stride(branch: usize) -> usize {
    1 << branch
}

/// Get the output resolution for a given input resolution.
///
/// The input must be a multiple of the stride.
///
/// # Arguments
///
/// - `input_resolution`: ``[height_in=height_out*stride, width_in=width_out*stride]``.
///
/// # Returns
///
/// ``[height_out, width_out]``
///
/// # Panics
///
/// If the input resolution is not a multiple of the stride.
#[inline(always)]
pub fn stride_div_output_resolution(
    input_resolution: [usize; 2],
    stride: usize,
) -> [usize; 2] {
    unpack_shape_contract!(
        [
            "height_in" = "height_out" * "stride",
            "width_in" = "width_out" * "stride"
        ],
        &input_resolution,
        &["height_out", "width_out"],
        &[("stride", stride)]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_channels() {
        assert_eq!(branch_channels(18, 0), 18);
        assert_eq!(branch_channels(18, 1), 36);
        assert_eq!(branch_channels(18, 3), 144);
        assert_eq!(branch_channels_list(32, 4), vec![32, 64, 128, 256]);
        assert!(branch_channels_list(32, 0).is_empty());
    }

    #[test]
    fn test_branch_stride() {
        assert_eq!(branch_stride(0), 1);
        assert_eq!(branch_stride(3), 8);
    }

    #[test]
    fn test_stride_div_output_resolution() {
        assert_eq!(stride_div_output_resolution([64, 32], 4), [16, 8]);
        assert_eq!(stride_div_output_resolution([7, 9], 1), [7, 9]);
    }

    #[test]
    #[should_panic(expected = "7 !~ height_in=(height_out*stride)")]
    fn test_stride_div_output_resolution_panic() {
        stride_div_output_resolution([7, 8], 2);
    }
}
