use mobi_xray::{
    xray_file_name, ClipPadding, CompanionData, ContainerVariant, ExtractOptions, Vocabulary,
};
use std::error;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Builds an X-Ray database:
/// `xray <book> <vocabulary.json> <asin> [out-dir] [--azw3] [--seed N] [--source URL]`
fn main() -> Result<(), Box<dyn error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let mut positional = Vec::new();
    let mut options = ExtractOptions::builder();
    let mut provenance = String::new();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--azw3" => options = options.variant(ContainerVariant::Azw3),
            "--seed" => {
                let seed = args.next().ok_or("--seed requires a value")?.parse()?;
                options = options.clip_padding(ClipPadding::Seeded(seed));
            }
            "--random" => options = options.clip_padding(ClipPadding::Random),
            "--source" => provenance = args.next().ok_or("--source requires a value")?,
            _ => positional.push(arg),
        }
    }

    if positional.len() < 3 {
        eprintln!("usage: xray <book> <vocabulary.json> <asin> [out-dir] [--azw3] [--seed N] [--random] [--source URL]");
        std::process::exit(2);
    }

    let book = std::fs::read(&positional[0])?;
    let vocabulary = Vocabulary::from_json_slice(&std::fs::read(&positional[1])?)?;
    let out_dir = positional.get(3).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    let path = out_dir.join(xray_file_name(&positional[2]));

    let data = CompanionData::extract(&book, &vocabulary, &options.build())?;
    let summary = data.write(&path, &provenance)?;
    println!(
        "{}: {} excerpts, {} clips, {} people, {} terms",
        path.display(),
        data.excerpts().len(),
        data.clips().len(),
        summary.person_count,
        summary.term_count
    );
    Ok(())
}
