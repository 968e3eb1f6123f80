fn main() {
    polfmt::cli::run();
}
