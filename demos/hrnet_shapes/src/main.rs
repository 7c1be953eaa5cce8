#![recursion_limit = "256"]

use burn::backend::NdArray;
use burn::prelude::Tensor;
use clap::Parser;
use hrnet::models::hrnet::hrnet_backbone;
use hrnet::models::hrnet::hrnet_model::HighResolutionNetMeta;
use hrnet::models::hrnet::prefabs::prefab_names;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Backbone variant.
    #[arg(long, default_value = "hrnet_w18")]
    model: String,

    /// Batch size of the probe input.
    #[arg(long, default_value_t = 1)]
    batch_size: usize,

    /// Probe input height; a multiple of the backbone's max stride.
    #[arg(long, default_value_t = 256)]
    height: usize,

    /// Probe input width; a multiple of the backbone's max stride.
    #[arg(long, default_value_t = 192)]
    width: usize,

    /// List the known variants and exit.
    #[arg(long)]
    list: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    if args.list {
        for name in prefab_names() {
            println!("{name}");
        }
        return Ok(());
    }

    type B = NdArray<f32>;
    let device = Default::default();

    let model = hrnet_backbone::<B>(&args.model, &device)?;

    let max_stride = model.max_stride();
    if args.height % max_stride != 0 || args.width % max_stride != 0 {
        anyhow::bail!(
            "input resolution {}x{} is not a multiple of {max_stride}",
            args.height,
            args.width
        );
    }

    tracing::info!(
        model = %args.model,
        batch_size = args.batch_size,
        height = args.height,
        width = args.width,
        "running probe forward pass"
    );

    let input = Tensor::zeros(
        [args.batch_size, model.in_channels(), args.height, args.width],
        &device,
    );
    let (low_level, features) = model.forward(input);

    println!("model:     {}", args.model);
    println!("low_level: {:?}", low_level.dims());
    println!("features:  {:?}", features.dims());

    Ok(())
}
