use anyhow::{Context, Result, bail};
use clap::Parser;
use uvc_inmem_lib::channel::{ChannelConfig, StreamChannel, Wait};
use uvc_inmem_lib::constants::{STREAM_BUF_SIZE, UVC_HEADER_SIZE};
use uvc_inmem_lib::{FrameTable, Segmenter};

/// Prints how frames of the given lengths are cut into bulk transfers.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Frame lengths in bytes.
    #[arg(required = true, value_delimiter = ',')]
    lengths: Vec<u32>,
    /// Transfer buffer size, header included.
    #[arg(short, long, default_value_t = STREAM_BUF_SIZE)]
    buffer_size: usize,
    /// Passes over the frame table, to show the frame-ID toggle.
    #[arg(short, long, default_value_t = 1)]
    passes: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.buffer_size <= UVC_HEADER_SIZE {
        bail!("Buffer size must exceed the {} byte header", UVC_HEADER_SIZE);
    }

    let frames = FrameTable::from_frames(cli.lengths.iter().map(|&len| vec![0u8; len as usize]))
        .context("Failed to build frame table")?;
    let (channel, mut consumer) = StreamChannel::create(ChannelConfig {
        buffer_size: cli.buffer_size,
        buffer_count: 1,
        header_size: UVC_HEADER_SIZE,
    })?;
    channel.set_transfer(0)?;

    println!(
        "{} byte buffers, {} byte payload per buffer",
        cli.buffer_size,
        cli.buffer_size - UVC_HEADER_SIZE
    );
    println!("--------------------------------------------------------------------------------");

    let mut segmenter = Segmenter::new();
    let mut total_buffers = 0;
    for _ in 0..cli.passes {
        for index in 0..frames.len() {
            let mut commits = 0;
            let last = loop {
                let mut buffer = channel.acquire(Wait::Forever).await?;
                let segment = segmenter.fill(&frames, &mut buffer)?;
                channel.commit(buffer, segment.commit_len)?;
                if let Some(committed) = consumer.try_next() {
                    consumer.release(committed);
                }
                segmenter.advance(&frames, &segment);

                commits += 1;
                if segment.end_of_frame {
                    break segment;
                }
            };

            total_buffers += commits;
            println!(
                "frame {:>3} {:>8} B  FID={}  {:>4} buffers  last {:>5} B{}",
                index,
                frames.frame_len(index),
                u8::from(last.frame_id),
                commits,
                last.commit_len,
                if last.payload_len == 0 { " (header only)" } else { "" }
            );
        }
    }

    println!("--------------------------------------------------------------------------------");
    println!("{} buffers for {} frame(s)", total_buffers, frames.len() * cli.passes);
    Ok(())
}
