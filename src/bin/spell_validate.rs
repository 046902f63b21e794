use daybreak::spells::library::SpellLibrary;

fn main() -> Result<(), String> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        return Err("usage: spell_validate <spell-dir>".to_string());
    }

    let mut library = SpellLibrary::new();
    let loaded = library.load_dir(std::path::Path::new(&args[1]))?;
    let findings = library.validate();

    println!("spell definition check:");
    println!("- spells: {}", loaded);
    println!("- lines: {}", library.line_count());
    println!("- findings: {}", findings.len());
    if !findings.is_empty() {
        for finding in &findings {
            println!("- {}", finding);
        }
        return Err("spell definition problems detected".to_string());
    }

    Ok(())
}
