fn main() {
    spin_pipeline::cli::run();
}
