fn main() {
    if let Err(err) = commitfs::cli::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
