use kv_manager::config::Config;

fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    kv_manager::logger::init(&config)?;

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.worker_threads)
        .enable_all()
        .build()?
        .block_on(kv_manager::startup(config))
}
