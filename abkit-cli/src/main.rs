fn main() -> anyhow::Result<()> {
    abkit_cli::run()
}
