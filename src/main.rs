fn main() -> anyhow::Result<()> {
    serialmon_lib::run()
}
