use std::sync::Arc;
use tileflow::{
    runtime::default_spawner, FrameCache, MemoryTileSource, Point, TileCoord, TileLayer,
    TileSchema, Viewport,
};

/// Example of driving a tile layer without any UI: pan and zoom a viewport,
/// fetch from a sparse in-memory source and report what would be drawn.
#[tokio::main]
async fn main() -> tileflow::Result<()> {
    tileflow::init_logging();

    let schema = TileSchema::global_spherical_mercator();
    let source = Arc::new(MemoryTileSource::new());
    // Levels 0..=3 exist everywhere, deeper levels only in the north-west.
    for level in 0..=5u8 {
        let n = 1i32 << level;
        let limit = if level <= 3 { n } else { n / 2 };
        for col in 0..limit {
            for row in 0..limit {
                source.insert(TileCoord::new(col, row, level), vec![level; 64]);
            }
        }
    }

    let layer = TileLayer::new("osm", schema.clone())?;
    let events = layer.subscribe();
    let dispatcher = Arc::new(layer.dispatcher(source.clone()));
    let frames: FrameCache<String> = FrameCache::from_config(layer.config());

    let stops = [
        ("world", Point::new(0.0, 0.0), 2u8),
        ("north-west", Point::new(-1.0e7, 1.0e7), 4),
        ("south-east", Point::new(1.0e7, -1.0e7), 5),
    ];

    for (name, center, level) in stops {
        let resolution = schema
            .resolution(level)
            .map(|r| r.units_per_pixel)
            .unwrap_or(1.0);
        let viewport = Viewport::from_center(center, resolution, 1024.0, 768.0);
        layer.set_viewport(&viewport);

        // Background fetching on the runtime when available, otherwise inline
        match default_spawner() {
            Some(spawner) => loop {
                dispatcher.pump(&spawner);
                if dispatcher.active_fetches() == 0 {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            },
            None => {
                dispatcher.drain().await;
            }
        }

        frames.begin_frame();
        let set = layer.get_features(&viewport.extent, viewport.resolution);
        let prepared = frames.prepare_all(&set, |tile| format!("texture:{}", tile.coord));
        let released = frames.end_frame();

        println!(
            "{:<10} level {} -> {} tiles: {} exact, {} blank, {} drawables ({} released)",
            name,
            set.level,
            set.len(),
            set.exact_count(),
            set.blank_count(),
            prepared.len(),
            released
        );
    }

    let errors = events.try_iter().filter(|e| e.error().is_some()).count();
    let stats = layer.cache_stats();
    println!(
        "fetched {} tiles, cache holds {} (hit rate {:.0}%), {} fetch errors",
        source.requests().len(),
        stats.size,
        stats.hit_rate() * 100.0,
        errors
    );

    dispatcher.shutdown();
    layer.dispose();
    Ok(())
}
