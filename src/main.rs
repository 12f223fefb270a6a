fn main() {
    paint_cluster::cli::run();
}
