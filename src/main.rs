fn main() -> anyhow::Result<()> {
    thousand_months::cli::run()
}
