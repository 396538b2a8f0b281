//! `flake`: a command-line driver for [`flac_encode`], mirroring the
//! original `flake` tool's argument surface (`flake/flake.c`).

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;

use flac_encode::encoder::{EncodeParams, FlacEncoder, StereoMethod};
use flac_encode::metadata::VorbisComment;
use flac_encode::residual::{OrderMethod, PredictionType};

/// Lossless PCM to FLAC encoder.
#[derive(Parser, Debug)]
#[command(name = "flake", version, about)]
struct Cli {
    /// Input WAV file.
    input: PathBuf,

    /// Output FLAC file (defaults to the input path with a .flac extension).
    #[arg(short = 'o')]
    output: Option<PathBuf>,

    /// Compression level 0-12. The original takes this as a bare digit
    /// flag (`-8`), stripped out of argv before clap ever sees it (see
    /// [`extract_compression_level`]); `--compression` is kept as a
    /// long-form alias for scripts that prefer a named option.
    #[arg(long = "compression")]
    compression: Option<u32>,

    /// Padding bytes to reserve in the header.
    #[arg(short = 'p', long = "padding")]
    padding: Option<u32>,

    /// Block size in samples (16-65535).
    #[arg(short = 'b', long = "block-size")]
    block_size: Option<u32>,

    /// Prediction type: 0 = fixed, 1 = LPC.
    #[arg(short = 't', long = "prediction-type")]
    prediction_type: Option<u32>,

    /// Prediction order, as "max" or "min,max".
    #[arg(short = 'l', long = "order")]
    order: Option<String>,

    /// Order selection method: 0=max 1=estimate 2=2-level 3=4-level
    /// 4=8-level 5=search 6=log.
    #[arg(short = 'm', long = "order-method")]
    order_method: Option<u32>,

    /// Rice partition order, as "max" or "min,max".
    #[arg(short = 'r', long = "partition-order")]
    partition_order: Option<String>,

    /// Stereo decorrelation: 0=independent 1=mid-side estimate.
    #[arg(short = 's', long = "stereo-method")]
    stereo_method: Option<u32>,

    /// Enable (1) or disable (0) variable block size, overriding the
    /// compression preset's default.
    #[arg(short = 'v', long = "vbs", value_parser = parse_bool_flag)]
    variable_block_size: Option<bool>,

    /// Suppress informational logging.
    #[arg(short = 'q', long)]
    quiet: bool,
}

fn parse_bool_flag(s: &str) -> std::result::Result<bool, String> {
    match s {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err("must be 0 or 1".to_string()),
    }
}

/// Pull a bare digit flag (`-0`..`-12`) out of the argument list before
/// handing the rest to clap, mirroring `flake.c:181-192`'s
/// `argv[i][1] >= '0' && argv[i][1] <= '9'` branch: a lone `-` followed
/// by one or two digits selects the compression level directly, rather
/// than naming an option. Longer digit runs (e.g. a `-1234` filename)
/// are left alone, matching the original's `argv[i][2] != '\0' &&
/// argv[i][3] != '\0'` filename fallback.
fn extract_compression_level(args: &mut Vec<String>) -> Option<u32> {
    let mut found = None;
    args.retain(|a| {
        let Some(rest) = a.strip_prefix('-') else {
            return true;
        };
        if rest.is_empty() || rest.len() > 2 || !rest.bytes().all(|b| b.is_ascii_digit()) {
            return true;
        }
        if let Ok(level) = rest.parse::<u32>() {
            found = Some(level);
            return false;
        }
        true
    });
    found
}

fn parse_pair(s: &str) -> Result<(Option<u32>, u32)> {
    if let Some((a, b)) = s.split_once(',') {
        Ok((Some(a.parse()?), b.parse()?))
    } else {
        Ok((None, s.parse()?))
    }
}

struct WavInfo {
    channels: u32,
    sample_rate: u32,
    bits_per_sample: u32,
    data_offset: u64,
    data_size: u64,
}

const RIFF_ID: &[u8; 4] = b"RIFF";
const WAVE_ID: &[u8; 4] = b"WAVE";
const FMT_ID: &[u8; 4] = b"fmt ";
const DATA_ID: &[u8; 4] = b"data";

/// Parse just enough of a WAV container to locate the `fmt ` and `data`
/// chunks, mirroring `wavfile_init`'s chunk walk. Only integer PCM is
/// supported; WAVE_FORMAT_EXTENSIBLE's embedded subtype is unwrapped.
fn read_wav_header<R: Read + Seek>(r: &mut R) -> Result<WavInfo> {
    let mut tag = [0u8; 4];
    r.read_exact(&mut tag)?;
    if &tag != RIFF_ID {
        bail!("not a RIFF file");
    }
    r.seek(SeekFrom::Current(4))?;
    r.read_exact(&mut tag)?;
    if &tag != WAVE_ID {
        bail!("not a WAVE file");
    }

    let mut channels = 0u32;
    let mut sample_rate = 0u32;
    let mut bit_width = 0u32;
    let mut found_fmt = false;

    loop {
        let mut id = [0u8; 4];
        if r.read_exact(&mut id).is_err() {
            bail!("WAV file has no data chunk");
        }
        let mut size_buf = [0u8; 4];
        r.read_exact(&mut size_buf)?;
        let mut chunk_size = u32::from_le_bytes(size_buf) as u64;

        if &id == FMT_ID {
            if chunk_size < 16 {
                bail!("fmt chunk too small");
            }
            let mut fmt_buf = [0u8; 16];
            r.read_exact(&mut fmt_buf)?;
            let format = u16::from_le_bytes([fmt_buf[0], fmt_buf[1]]);
            channels = u16::from_le_bytes([fmt_buf[2], fmt_buf[3]]) as u32;
            sample_rate = u32::from_le_bytes([fmt_buf[4], fmt_buf[5], fmt_buf[6], fmt_buf[7]]);
            bit_width = u16::from_le_bytes([fmt_buf[14], fmt_buf[15]]) as u32;
            chunk_size -= 16;

            let mut actual_format = format;
            if format == 0xFFFE && chunk_size >= 10 {
                let mut ext = [0u8; 10];
                r.read_exact(&mut ext)?;
                actual_format = u16::from_le_bytes([ext[8], ext[9]]);
                chunk_size -= 10;
            }
            if actual_format != 1 {
                bail!("only integer PCM WAV input is supported (format tag {actual_format})");
            }
            if chunk_size > 0 {
                r.seek(SeekFrom::Current(chunk_size as i64))?;
            }
            found_fmt = true;
        } else if &id == DATA_ID {
            if !found_fmt {
                bail!("data chunk appeared before fmt chunk");
            }
            let data_offset = r.stream_position()?;
            return Ok(WavInfo {
                channels,
                sample_rate,
                bits_per_sample: bit_width,
                data_offset,
                data_size: chunk_size,
            });
        } else {
            r.seek(SeekFrom::Current(chunk_size as i64))?;
        }
    }
}

fn main() -> Result<()> {
    let mut raw_args: Vec<String> = std::env::args().collect();
    let digit_compression = extract_compression_level(&mut raw_args);

    let cli = Cli::parse_from(raw_args);
    let compression = digit_compression.or(cli.compression).unwrap_or(5);

    if cli.quiet {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Warn)
            .init();
    } else {
        env_logger::init();
    }

    let mut reader = BufReader::new(
        File::open(&cli.input).with_context(|| format!("opening {}", cli.input.display()))?,
    );
    let wav = read_wav_header(&mut reader)?;
    info!(
        "{}: {}ch {}Hz {}bit, {} bytes of audio data",
        cli.input.display(),
        wav.channels,
        wav.sample_rate,
        wav.bits_per_sample,
        wav.data_size
    );

    reader.seek(SeekFrom::Start(wav.data_offset))?;
    let mut raw = vec![0u8; wav.data_size as usize];
    reader.read_exact(&mut raw)?;

    let mut params = EncodeParams::from_compression_level(compression)?;
    if let Some(bs) = cli.block_size {
        params.block_size = bs;
    }
    if let Some(padding) = cli.padding {
        params.padding_size = padding;
    }
    if let Some(pt) = cli.prediction_type {
        params.prediction_type = match pt {
            0 => PredictionType::Fixed,
            1 => PredictionType::Lpc,
            _ => bail!("prediction type must be 0 (fixed) or 1 (LPC)"),
        };
    }
    if let Some(order) = &cli.order {
        let (min, max) = parse_pair(order)?;
        params.max_prediction_order = max;
        if let Some(min) = min {
            params.min_prediction_order = min;
        }
    }
    if let Some(m) = cli.order_method {
        params.order_method = match m {
            0 => OrderMethod::Max,
            1 => OrderMethod::Est,
            2 => OrderMethod::TwoLevel,
            3 => OrderMethod::FourLevel,
            4 => OrderMethod::EightLevel,
            5 => OrderMethod::Search,
            6 => OrderMethod::Log,
            _ => bail!("order method must be 0-6"),
        };
    }
    if let Some(porder) = &cli.partition_order {
        let (min, max) = parse_pair(porder)?;
        params.max_partition_order = max;
        if let Some(min) = min {
            params.min_partition_order = min;
        }
    }
    if let Some(s) = cli.stereo_method {
        params.stereo_method = match s {
            0 => StereoMethod::Independent,
            1 => StereoMethod::Estimate,
            _ => bail!("stereo method must be 0 or 1"),
        };
    }
    if let Some(vbs) = cli.variable_block_size {
        params.variable_block_size = vbs;
    }

    let samples = flac_encode::pcm::unpack_interleaved(&raw, wav.channels, wav.bits_per_sample)?;
    let total_samples = (samples.len() as u64) / wav.channels as u64;

    let output_path = cli.output.unwrap_or_else(|| cli.input.with_extension("flac"));
    let out_file = BufWriter::new(
        File::create(&output_path).with_context(|| format!("creating {}", output_path.display()))?,
    );

    let vc = VorbisComment::new();
    let mut encoder = FlacEncoder::init(
        out_file,
        wav.channels,
        wav.sample_rate,
        wav.bits_per_sample,
        total_samples,
        params.clone(),
        &vc,
    )?;

    let mut offset = 0usize;
    while offset < samples.len() {
        let remaining = (samples.len() - offset) / wav.channels as usize;
        let this_block = remaining.min(params.block_size as usize);
        if this_block == 0 {
            break;
        }
        let end = offset + this_block * wav.channels as usize;
        encoder.encode_frame(&samples[offset..end], this_block as u32)?;
        offset = end;
    }

    let streaminfo = encoder.finish_and_patch_streaminfo()?;
    info!(
        "wrote {} ({} samples, md5 {})",
        output_path.display(),
        streaminfo.total_samples,
        streaminfo
            .md5_signature
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<String>()
    );

    Ok(())
}
