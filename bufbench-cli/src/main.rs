fn main() -> anyhow::Result<()> {
    bufbench_cli::run()
}
