fn main() {
    if let Err(e) = emr_scribe_lib::run() {
        eprintln!("emr-scribe: {e}");
        std::process::exit(1);
    }
}
