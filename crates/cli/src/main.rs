//! Command-line interface for 7z packaging and extraction.
//!
//! Each subcommand is one mode of the tool: packaging a directory, listing
//! or extracting an archive, and the MD5 helpers used for archive names.

use clap::{ArgGroup, Parser, Subcommand};
use packer::extract::extract_with;
use packer::password;
use packer::probe::format_listing;
use packer::{
    ArchivePlan, CompressOptions, CompressStats, CompressionLevel, ExtractMode, ExtractOptions,
    ExtractionRecord, NamingOptions, SevenZipCodec,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "compact7z")]
#[command(version, about = "Package and unpack 7z archives with obfuscated passwords", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Package a directory into a randomly named .7z archive
    #[command(name = "compress")]
    Compress {
        /// Directory to package
        #[arg(long)]
        input_dir: PathBuf,

        /// Directory the archive is written to
        #[arg(long)]
        output: PathBuf,

        /// Base password (defaults to the archive's random token)
        #[arg(long)]
        password: Option<String>,

        /// Text placed before the obfuscated password
        #[arg(long, default_value = "")]
        password_prefix: String,

        /// Text placed after the obfuscated password
        #[arg(long, default_value = "")]
        password_suffix: String,

        /// Log the password and its parts
        #[arg(long)]
        password_show: bool,

        /// Insert random letters into the archive name
        #[arg(long, default_value_t = false, action = clap::ArgAction::Set)]
        extra_enabled: bool,

        /// Number of random letters to insert
        #[arg(long, default_value_t = 32)]
        extra_count: usize,

        /// Compression level 0-9; anything else falls back to 0
        #[arg(long, default_value = "0")]
        compression_level: String,

        /// Leave the archive header unencrypted
        #[arg(long)]
        no_header_encryption: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the entries of an archive
    #[command(name = "quering_items_in_archive")]
    List {
        /// Archive file (or first .NNN volume)
        #[arg(long)]
        input_file: PathBuf,

        /// Password for archives with encrypted headers
        #[arg(long)]
        password: Option<String>,

        /// Candidate encoding for entry names (repeatable)
        #[arg(long = "encoding")]
        encodings: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Decode every entry and report its hash without writing files
    #[command(name = "extract_items_simple")]
    ExtractSimple {
        /// Archive file (or first .NNN volume)
        #[arg(long)]
        input_file: PathBuf,

        /// Password for encrypted archives
        #[arg(long)]
        password: Option<String>,

        /// Candidate encoding for entry names (repeatable)
        #[arg(long = "encoding")]
        encodings: Vec<String>,
    },

    /// Extract an archive into a directory
    #[command(name = "extract_items_standard")]
    ExtractStandard {
        /// Archive file (or first .NNN volume)
        #[arg(long)]
        input_file: PathBuf,

        /// Output directory
        #[arg(long)]
        output: PathBuf,

        /// Password for encrypted archives
        #[arg(long)]
        password: Option<String>,

        /// Candidate encoding for entry names (repeatable)
        #[arg(long = "encoding")]
        encodings: Vec<String>,
    },

    /// Print the MD5 of a string or a file
    #[command(name = "genMd5")]
    #[command(group(ArgGroup::new("source").required(true).args(["input_str", "input_file"])))]
    GenMd5 {
        #[arg(long)]
        input_str: Option<String>,

        #[arg(long)]
        input_file: Option<PathBuf>,
    },

    /// Recover the MD5 token from a decorated archive name
    #[command(name = "extractMd5")]
    ExtractMd5 {
        #[arg(long)]
        input_str: String,
    },
}

#[derive(Serialize)]
struct CompressSummary<'a> {
    archive: &'a Path,
    stats: &'a CompressStats,
}

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Compress {
            input_dir,
            output,
            password,
            password_prefix,
            password_suffix,
            password_show,
            extra_enabled,
            extra_count,
            compression_level,
            no_header_encryption,
            json,
        } => {
            let naming = NamingOptions {
                password,
                password_prefix,
                password_suffix,
                extra_count: extra_enabled.then_some(extra_count),
            };
            let options = CompressOptions {
                level: CompressionLevel::from_input(&compression_level),
                password: None,
                encrypt_header: !no_header_encryption,
            };
            handle_compress(&input_dir, &output, &naming, &options, password_show, json)
        }
        Commands::List {
            input_file,
            password,
            encodings,
            json,
        } => handle_list(&input_file, password.as_deref(), &encodings, json),
        Commands::ExtractSimple {
            input_file,
            password,
            encodings,
        } => handle_extract(&input_file, None, ExtractMode::Simple, password, encodings),
        Commands::ExtractStandard {
            input_file,
            output,
            password,
            encodings,
        } => handle_extract(
            &input_file,
            Some(&output),
            ExtractMode::Standard,
            password,
            encodings,
        ),
        Commands::GenMd5 {
            input_str,
            input_file,
        } => handle_gen_md5(input_str.as_deref(), input_file.as_deref()),
        Commands::ExtractMd5 { input_str } => handle_extract_md5(&input_str),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        if e.to_string().to_lowercase().contains("password") {
            eprintln!("Hint: check --password; the archive password includes its prefix, carriers and suffix");
        }
        process::exit(1);
    }
}

fn handle_compress(
    input_dir: &Path,
    output_dir: &Path,
    naming: &NamingOptions,
    options: &CompressOptions,
    password_show: bool,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let plan = ArchivePlan::new(output_dir, naming);
    let options = plan.options(options);

    if password_show {
        let parts = &plan.password;
        tracing::info!("PASSWORD_VALUE: {}", parts.base);
        tracing::info!("RANDOM_CHAR_B: {}", parts.carrier_b);
        tracing::info!("RANDOM_CHAR_A: {}", parts.carrier_a);
        tracing::info!("PASSWORD_PREFIX: {}", parts.prefix);
        tracing::info!("PASSWORD_SUFFIX: {}", parts.suffix);
        tracing::info!("password: {}", parts.compose());
    }

    let stats = packer::compress(input_dir, &plan.output, &options)?;

    if json {
        let summary = CompressSummary {
            archive: &plan.output,
            stats: &stats,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Archive: {}", plan.output.display());
        println!(
            "Stored {} files and {} directories ({} bytes -> {} bytes)",
            stats.files, stats.directories, stats.bytes_read, stats.archive_bytes
        );
    }
    Ok(())
}

fn handle_list(
    input_file: &Path,
    password: Option<&str>,
    encodings: &[String],
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let info = packer::probe(input_file, password, encodings)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        print!("{}", format_listing(&info));
        println!(
            "{} entries, {} volume(s), {} bytes{}",
            info.entries,
            info.volumes,
            info.compressed_bytes.unwrap_or(0),
            if info.encrypted { ", encrypted headers" } else { "" }
        );
    }
    Ok(())
}

fn handle_extract(
    input_file: &Path,
    output: Option<&Path>,
    mode: ExtractMode,
    password: Option<String>,
    encodings: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let options = ExtractOptions {
        mode,
        password,
        encodings,
    };

    println!("   Hash   |    Size    | Filename");
    println!("----------+------------+---------");
    let mut print_record = |record: &ExtractionRecord| println!("{record}");
    let report = extract_with(
        &SevenZipCodec::new(),
        input_file,
        output,
        &options,
        &mut print_record,
    )?;

    let stats = &report.stats;
    println!(
        "Files: {}, directories: {}, failed: {}, bytes: {}",
        stats.files_extracted, stats.directories_created, stats.items_failed, stats.bytes_written
    );
    Ok(())
}

fn handle_gen_md5(
    input_str: Option<&str>,
    input_file: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let md5 = match (input_str, input_file) {
        (Some(text), _) => password::md5_hex(text),
        (None, Some(path)) => password::md5_file(path)?,
        (None, None) => return Err("either --input-str or --input-file is required".into()),
    };
    println!("md5:{md5}");
    Ok(())
}

fn handle_extract_md5(input_str: &str) -> Result<(), Box<dyn std::error::Error>> {
    match password::extract_token(input_str) {
        Some(token) => {
            println!("extracted:{token}");
            Ok(())
        }
        None => Err(format!("no {}-digit token found in {input_str:?}", password::TOKEN_LEN).into()),
    }
}
