use clap::Parser;
use mbench::bench::{run_matmul_benchmarks, DEFAULT_MIN_RUN_TIME};
use mbench::report::{render, OutputFormat, Progress};
use mbench::{backend_version, resolve_precisions, select_device, Device, PrecisionFlags};
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about = "WebGPU matmul benchmark", long_about = None)]
struct Args {
    /// Run on the specified device.
    #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
    index: i64,

    /// Run FP64 benchmarks.
    #[arg(short, long)]
    double: bool,

    /// Run FP32 benchmarks.
    #[arg(short, long)]
    single: bool,

    /// Run BF16 benchmarks.
    #[arg(short, long)]
    bfloat: bool,

    /// Output in json format.
    #[arg(short, long)]
    json: bool,

    /// Minimum time spent measuring each benchmark, in seconds [default: 3].
    #[arg(long, value_parser = parse_seconds)]
    min_run_time: Option<Duration>,
}

fn parse_seconds(s: &str) -> Result<Duration, String> {
    let secs: f64 = s.parse().map_err(|e| format!("{e}"))?;
    match Duration::try_from_secs_f64(secs) {
        Ok(d) if !d.is_zero() => Ok(d),
        _ => Err(format!("expected a positive number of seconds, got {s}")),
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let index = select_device(args.index, Device::count())?;
    let device = Device::with_index(index).await?;
    let info = device.info();
    println!("Backend Version\t: {}", backend_version(info));
    println!("mbench Version\t: {}", env!("CARGO_PKG_VERSION"));
    println!("Device Name\t: {}", info.name);

    let flags = PrecisionFlags {
        double: args.double,
        single: args.single,
        bfloat: args.bfloat,
    };
    let precisions = resolve_precisions(flags, &device)?;
    let min_run_time = args.min_run_time.unwrap_or(DEFAULT_MIN_RUN_TIME);

    let mut progress = Progress::stdout();
    let table = run_matmul_benchmarks(&device, &precisions, min_run_time, |n, p| {
        progress.update(n, p)
    })?;
    progress.finish()?;

    let format = if args.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };
    println!("{}", render(&table, format)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    if let Err(err) = pollster::block_on(run(args)) {
        match err.downcast_ref::<mbench::Error>() {
            Some(e) if e.is_user_facing() => {
                println!("Error: {e}");
                std::process::exit(1)
            }
            _ => return Err(err),
        }
    }
    Ok(())
}
