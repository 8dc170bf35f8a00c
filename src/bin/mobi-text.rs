use std::error;
use std::io::{self, Read, Write};

/// Writes a book's reconstructed markup to stdout
fn main() -> Result<(), Box<dyn error::Error>> {
    let data = match std::env::args().nth(1) {
        Some(path) => std::fs::read(path)?,
        None => {
            let mut data = Vec::new();
            io::stdin().read_to_end(&mut data)?;
            data
        }
    };

    let text = mobi_xray::read_book_text(&data)?;
    let stdout = io::stdout();
    let mut lock = stdout.lock();
    lock.write_all(text.markup())?;
    Ok(())
}
