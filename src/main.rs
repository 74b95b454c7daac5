fn main() -> anyhow::Result<()> {
    picologger_lib::run()
}
