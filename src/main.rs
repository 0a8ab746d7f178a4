fn main() {
    if let Err(err) = ipums_tsv::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
