use bamsift::filter::{parse_tag_key, FilterSettings, ReadGroupSet, RegionFilter, RegionSet, Subsampler};
use bamsift::io::{DataSink, DataSource, FormatDescriptor};
use bamsift::view::{view, OutputConfig, ViewConfig};
use bamsift::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    version = env!("CARGO_PKG_VERSION"),
    about = env!("CARGO_PKG_DESCRIPTION"),
    long_about = None,
)]
struct Cli {
    #[arg(help = "Input BAM/SAM file (plain, gzip or BGZF), or - for stdin")]
    input: String,

    #[arg(short = 'o', long, default_value = "-", help = "Output for accepted records")]
    output: String,

    #[arg(short = 'U', long, help = "Output for rejected records")]
    unmatched: Option<String>,

    #[arg(
        short = 'O',
        long = "output-fmt",
        help = "Output format: sam, bam, ubam or sam.gz (default: from the output name)"
    )]
    output_format: Option<FormatDescriptor>,

    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=9), help = "Compression level 0-9")]
    level: Option<u32>,

    #[arg(short = 'q', long = "min-mq", default_value_t = 0, help = "Minimum mapping quality")]
    min_mapq: u8,

    #[arg(short = 'f', long = "require-flags", value_parser = parse_flags, default_value = "0",
        help = "Keep records with all of these flag bits set")]
    flag_on: u16,

    #[arg(short = 'F', long = "exclude-flags", value_parser = parse_flags, default_value = "0",
        help = "Keep records with none of these flag bits set")]
    flag_off: u16,

    #[arg(short = 'm', long = "min-qlen", default_value_t = 0,
        help = "Minimum query length after clipping")]
    min_query_length: u64,

    #[arg(short = 'r', long = "region", help = "Keep records overlapping REGION (chr, chr:beg-end)")]
    regions: Vec<String>,

    #[arg(short = 's', long = "subsample", help = "Keep a fraction of templates, as SEED.FRAC")]
    subsample: Option<String>,

    #[arg(short = 'R', long = "read-group-file", help = "Keep records whose read group is listed in FILE")]
    read_group_file: Option<PathBuf>,

    #[arg(long = "read-group", help = "Keep records in this read group")]
    read_group: Option<String>,

    #[arg(short = 'l', long = "library", help = "Keep records in this library")]
    library: Option<String>,

    #[arg(short = 'x', long = "remove-tag", help = "Remove this aux tag from accepted records")]
    strip_tags: Vec<String>,
}

fn parse_flags(text: &str) -> std::result::Result<u16, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| format!("invalid flag value {:?}: {}", text, e))
}

impl Cli {
    fn filters(&self) -> Result<FilterSettings> {
        let region = if self.regions.is_empty() {
            None
        } else {
            Some(Box::new(RegionSet::parse(&self.regions)?) as Box<dyn RegionFilter>)
        };
        let subsample = self.subsample.as_deref().map(str::parse::<Subsampler>).transpose()?;

        let mut read_groups = match &self.read_group_file {
            Some(path) => Some(ReadGroupSet::from_path(path)?),
            None => None,
        };
        if let Some(id) = &self.read_group {
            read_groups.get_or_insert_with(ReadGroupSet::new).insert(id.clone());
        }

        let strip_tags = self
            .strip_tags
            .iter()
            .map(|tag| parse_tag_key(tag))
            .collect::<Result<Vec<_>>>()?;

        Ok(FilterSettings {
            min_query_length: self.min_query_length,
            min_mapq: self.min_mapq,
            flag_on: self.flag_on,
            flag_off: self.flag_off,
            region,
            subsample,
            read_groups,
            library: self.library.clone(),
            strip_tags,
        })
    }

    fn output(&self, name: &str) -> OutputConfig {
        let mut output = OutputConfig::new(DataSink::from_name(name));
        if let Some(format) = self.output_format {
            output.format = format;
        }
        if self.level.is_some() {
            output.format = output.format.with_level(self.level);
        }
        output
    }

    fn into_config(self) -> Result<ViewConfig> {
        Ok(ViewConfig {
            input: DataSource::from_name(&self.input),
            output: self.output(&self.output),
            unmatched: self.unmatched.as_deref().map(|name| self.output(name)),
            filters: self.filters()?,
        })
    }
}

fn main() -> ExitCode {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("bamsift: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let report = view(config);
    for error in &report.errors {
        eprintln!("bamsift: {}", error);
    }
    ExitCode::from(report.exit_code())
}
