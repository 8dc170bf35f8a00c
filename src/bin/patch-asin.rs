use mobi_xray::PatchOutcome;
use std::error;

/// Sets a book's ASIN in place: `patch-asin <book> <asin>`
fn main() -> Result<(), Box<dyn error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 3 {
        eprintln!("usage: {} <book> <asin>", args[0]);
        std::process::exit(2);
    }

    let path = &args[1];
    let mut data = std::fs::read(path)?;
    match mobi_xray::patch_identifier(&mut data, &args[2])? {
        PatchOutcome::Unchanged => println!("{} already has asin {}", path, args[2]),
        outcome => {
            std::fs::write(path, &data)?;
            println!("{}: {:?}", path, outcome);
        }
    }

    println!("{}", mobi_xray::xray_file_name(&args[2]));
    Ok(())
}
