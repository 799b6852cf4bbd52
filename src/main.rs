fn main() -> anyhow::Result<()> {
    matlist::cli::run()
}
