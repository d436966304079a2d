//! Views one model file, turning slowly in front of the camera.
//!
//! Usage: `showroom <model path below the asset root>`. The asset root is
//! `./assets` unless `GLANCER_ASSETS` says otherwise.

use std::rc::Rc;

use anyhow::Context as _;
use futures::FutureExt;
use glancer::{
    Resources, Settings,
    data_structures::scene_graph::{Scene, ShowRoomScene},
    flow,
};

fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .context("usage: showroom <model path>")?;
    let settings = Settings::from_env();

    flow::run(
        settings,
        Box::new(move |resources: Rc<Resources>| {
            async move {
                let model = resources
                    .get_model(&path)
                    .await
                    .with_context(|| format!("loading {path}"))?;
                log::info!("showing {path}, radius {}", model.radius());
                let scene: Box<dyn Scene> = Box::new(ShowRoomScene::new(model));
                Ok(scene)
            }
            .boxed_local()
        }),
    )
}
