mod app;

use app::App;
use color_eyre::Result;
use vkscene::renderer::config::RenderConfig;

fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::init();

    // Model files to load from the model directory, in order
    let model_files = std::env::args().skip(1).collect::<Vec<_>>();

    let app = App::new(RenderConfig::default(), model_files);
    app.run()?;

    Ok(())
}
