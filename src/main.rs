use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use colored::*;
use site2book::{writer, BookBuilder, LinkMap, LinkRewriter, OutputMode, SiteProfile};
use std::path::{Path, PathBuf};
use std::process;
use tokio::fs;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "site2book")]
#[command(about = "CLI utility to assemble a documentation website into a print-ready book")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Site {
    /// Site profile (JSON); defaults to the built-in nuejs.org profile
    #[arg(long = "profile")]
    profile: Option<PathBuf>,

    /// Link map (JSON object of slug to section title or null)
    #[arg(long = "link-map")]
    link_map: Option<PathBuf>,
}

#[derive(Args)]
struct Build {
    #[command(flatten)]
    site: Site,

    /// Output directory used to save files
    #[arg(short = 'o', long = "outDir", default_value = "output_site2book")]
    out_dir: String,

    /// How the book is split into files
    #[arg(short = 'm', long = "mode", value_enum, default_value_t = OutputMode::Sections)]
    mode: OutputMode,

    /// Request timeout in seconds
    #[arg(short = 't', long = "timeout", default_value = "30.0", value_parser = parse_timeout)]
    timeout: f64,

    /// Show the browser window while fetching
    #[arg(long = "headful")]
    headful: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an HTML book from the rendered documentation site
    Html {
        /// Docs index URL (overrides the profile)
        url: Option<String>,

        #[command(flatten)]
        build: Build,
    },
    /// Build PDFs from the rendered documentation site
    Pdf {
        /// Docs index URL (overrides the profile)
        url: Option<String>,

        #[command(flatten)]
        build: Build,

        /// Merge the generated PDFs into a single file
        #[arg(long = "combine")]
        combine: bool,
    },
    /// Build a Markdown manuscript from the site's topics file and Markdown sources
    Markdown {
        #[command(flatten)]
        build: Build,
    },
    /// Point internal links of an existing HTML file inside the document
    FixLinks {
        /// HTML file to rewrite in place
        file: PathBuf,

        #[command(flatten)]
        site: Site,
    },
    /// Merge existing PDF files into a single document
    Merge {
        /// Directory containing PDF files to merge
        #[arg(short = 'd', long = "dir", default_value = "output_site2book/pdfs")]
        input_dir: String,

        /// Output file path for the merged PDF
        #[arg(short = 'o', long = "output", default_value = "merged.pdf")]
        output_file: String,
    },
}

fn parse_timeout(s: &str) -> Result<f64, String> {
    let value = s.parse::<f64>().map_err(|_| "Not a number.")?;
    if value <= 0.0 || !value.is_finite() {
        return Err("Must be a positive number.".to_string());
    }
    Ok(value)
}

impl Site {
    async fn load(&self) -> Result<(SiteProfile, LinkMap)> {
        let profile = SiteProfile::load(self.profile.as_deref()).await?;
        let link_map = match &self.link_map {
            Some(path) => LinkMap::load(path).await?,
            None => LinkMap::builtin(),
        };
        Ok((profile, link_map))
    }
}

impl Build {
    async fn builder(&self) -> Result<BookBuilder> {
        let (profile, link_map) = self.site.load().await?;
        Ok(BookBuilder::new(profile, link_map, &self.out_dir, self.mode, self.timeout)?
            .headful(self.headful))
    }
}

async fn fix_links(file: &Path, site: &Site) -> Result<()> {
    let (profile, link_map) = site.load().await?;
    let rewriter = LinkRewriter::new(link_map, &profile.link_prefix, &profile.external_base)?;

    info!("Fixing internal links in {}...", file.display().to_string().green());
    let stats = writer::rewrite_file(file, &rewriter).await?;

    info!("✓ Processed {} internal links:", stats.total());
    if stats.internal > 0 {
        info!("  - {} converted to internal anchors", stats.internal);
    }
    if stats.external + stats.unmapped > 0 {
        info!(
            "  - {} converted to external links",
            stats.external + stats.unmapped
        );
    }
    if stats.unmapped > 0 {
        warn!("  ⚠ {} links had no link map entry", stats.unmapped);
    }
    Ok(())
}

async fn merge_pdfs(input_dir: &str, output_file: &str) -> Result<()> {
    let input_path = PathBuf::from(input_dir);

    if !input_path.exists() {
        return Err(anyhow::anyhow!("Input directory '{}' does not exist", input_dir));
    }

    info!("Scanning directory: {}", input_dir.green());

    let mut entries = fs::read_dir(&input_path).await?;
    let mut pdf_files = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "pdf") {
            pdf_files.push(path);
        }
    }

    if pdf_files.is_empty() {
        return Err(anyhow::anyhow!("No PDF files found in '{}'", input_dir));
    }

    // numbered file names keep book order
    pdf_files.sort();

    info!("Found {} PDF files to merge:", pdf_files.len());
    for (i, path) in pdf_files.iter().enumerate() {
        info!("  {}: {}", i + 1, path.display().to_string().blue());
    }

    writer::merge_pdfs(&pdf_files, Path::new(output_file)).await
}

#[tokio::main]
async fn main() {
    // Set up logging with chromiumoxide errors suppressed
    let filter = EnvFilter::builder()
        .with_default_directive("site2book=info".parse().expect("valid directive"))
        .from_env_lossy()
        .add_directive("chromiumoxide::conn=off".parse().expect("valid directive"))
        .add_directive("chromiumoxide::handler=off".parse().expect("valid directive"));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Html { url, build } => match build.builder().await {
            Ok(builder) => builder.html(url.as_deref()).await.map(|_| ()),
            Err(e) => Err(e),
        },
        Commands::Pdf { url, build, combine } => match build.builder().await {
            Ok(builder) => builder.pdf(url.as_deref(), combine).await.map(|_| ()),
            Err(e) => Err(e),
        },
        Commands::Markdown { build } => match build.builder().await {
            Ok(builder) => builder.markdown().await.map(|_| ()),
            Err(e) => Err(e),
        },
        Commands::FixLinks { file, site } => fix_links(&file, &site).await,
        Commands::Merge {
            input_dir,
            output_file,
        } => merge_pdfs(&input_dir, &output_file).await,
    };

    if let Err(e) = result {
        error!("{}", format!("Error: {:#}", e).red());
        process::exit(1);
    }
}
