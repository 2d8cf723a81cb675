fn main() {
    if let Err(err) = sheet_migrator::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
