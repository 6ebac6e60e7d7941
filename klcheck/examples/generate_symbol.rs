//! Example: building a library through the model's builder API.
//! Run with: cargo run --example generate_symbol [output.kicad_sym]

use klcheck::symbol::{ElectricalType, Rectangle, Rotation};
use klcheck::{KlcError, Library, Pin, Symbol};
use std::path::PathBuf;

fn buffer(name: &str) -> Symbol {
    let mut symbol = Symbol::new(
        name,
        "Generated",
        "U",
        "Package_SO:SOIC-8_3.9x4.9mm_P1.27mm",
        "~",
        "buffer amplifier",
        "Single buffer amplifier",
        &["SOIC*3.9x4.9mm*P1.27mm*"],
    );
    symbol
        .push_rectangle(Rectangle::new_mil(-200.0, 200.0, 200.0, -200.0))
        .push_pin(Pin::new("IN", "1", ElectricalType::Input).at(-7.62, 0.0, Rotation::R0))
        .push_pin(Pin::new("OUT", "2", ElectricalType::Output).at(7.62, 0.0, Rotation::R180))
        .push_pin(Pin::new("V+", "3", ElectricalType::PowerIn).at(0.0, 7.62, Rotation::R270))
        .push_pin(Pin::new("V-", "4", ElectricalType::PowerIn).at(0.0, -7.62, Rotation::R90));
    symbol
}

fn main() -> Result<(), KlcError> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("Generated.kicad_sym"));

    let mut library = Library::new(&path);
    for name in ["BUF1", "BUF2"] {
        library.add_symbol(buffer(name))?;
    }
    library.write()?;

    println!("Wrote {} symbols to {}", library.symbols.len(), path.display());
    Ok(())
}
