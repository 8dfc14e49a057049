//! `fleetctl`: thin binary entry point. Builds a single-threaded Tokio
//! runtime and hands off to the async command dispatcher in `lib.rs`,
//! mirroring the runtime setup in `fleetd`'s own `main.rs`.

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> anyhow::Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    rt.block_on(fleetctl::run())
}
