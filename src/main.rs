fn main() {
    #[cfg(feature = "cli")]
    svndelta::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("svndelta: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
