use std::sync::Arc;
use tileflow::{
    constants::MERCATOR_HALF_EXTENT, Extent, FetchError, FetchState, LayerEvent,
    MemoryTileSource, TileCoord, TileFetchConfig, TileImagery, TileLayer, TileSchema,
};

/// End-to-end scenarios driving a layer the way a map view does
#[cfg(test)]
mod layer_integration_tests {
    use super::*;

    const H: f64 = MERCATOR_HALF_EXTENT;

    fn exact_layer() -> TileLayer {
        TileLayer::builder("base", TileSchema::global_spherical_mercator())
            .with_config(TileFetchConfig {
                margin_levels: 0,
                keep_buffer: 0,
                ..TileFetchConfig::default()
            })
            .build()
            .unwrap()
    }

    fn level_resolution(layer: &TileLayer, level: u8) -> f64 {
        layer.schema().resolution(level).unwrap().units_per_pixel
    }

    /// Viewport covering exactly (0,0,1) and (1,0,1)
    fn top_half() -> Extent {
        Extent::new(-0.9 * H, 0.1 * H, 0.9 * H, 0.9 * H)
    }

    /// One tile present, its neighbour confirmed absent
    #[tokio::test]
    async fn test_present_and_absent_tiles_end_to_end() {
        let layer = exact_layer();
        let present = TileCoord::new(0, 0, 1);
        let absent = TileCoord::new(1, 0, 1);
        let source = Arc::new(MemoryTileSource::new().with_tile(present, vec![0xAB; 16]));
        let dispatcher = layer.dispatcher(source.clone());
        let resolution = level_resolution(&layer, 1);

        layer.viewport_changed(top_half(), resolution);
        assert_eq!(dispatcher.drain().await, 2);

        let set = layer.get_features(&top_half(), resolution);
        assert_eq!(set.len(), 2);
        match &set.get(&present).unwrap().imagery {
            TileImagery::Exact(tile) => assert_eq!(*tile.data, vec![0xAB; 16]),
            other => panic!("expected exact tile, got {:?}", other),
        }
        assert!(set.get(&absent).unwrap().imagery.is_blank());
        assert_eq!(layer.state_of(&absent), Some(FetchState::ConfirmedAbsent));

        layer.viewport_changed(top_half(), resolution);
        assert!(layer.get_fetch_jobs(0, 6).is_empty());
        assert_eq!(source.requests().len(), 2);
    }

    /// Absent tiles stay absent; failed tiles come back once per pass
    #[tokio::test]
    async fn test_absent_never_retried_failed_retried_on_revisit() {
        let layer = exact_layer();
        let flaky = TileCoord::new(0, 0, 1);
        let absent = TileCoord::new(1, 0, 1);
        let source = Arc::new(MemoryTileSource::new().with_tile(flaky, vec![1]));
        source.fail_next(flaky);
        let dispatcher = layer.dispatcher(source.clone());
        let resolution = level_resolution(&layer, 1);
        let events = layer.subscribe();

        layer.viewport_changed(top_half(), resolution);
        dispatcher.drain().await;
        assert_eq!(layer.state_of(&flaky), Some(FetchState::Failed));
        assert!(events.try_iter().any(|e| e.error().is_some()));

        for _ in 0..4 {
            layer.viewport_changed(top_half(), resolution);
            dispatcher.drain().await;
        }
        assert_eq!(source.request_count(&absent), 1);
        assert_eq!(source.request_count(&flaky), 2);
        assert_eq!(layer.state_of(&flaky), Some(FetchState::Ready));
    }

    /// While exact tiles are missing the parent is drawn in their place
    #[tokio::test]
    async fn test_zoom_in_uses_ancestor_until_children_arrive() {
        let layer = TileLayer::builder("base", TileSchema::global_spherical_mercator())
            .with_config(TileFetchConfig {
                margin_levels: 1,
                keep_buffer: 0,
                ..TileFetchConfig::default()
            })
            .build()
            .unwrap();
        let schema = TileSchema::global_spherical_mercator();
        let source = Arc::new(MemoryTileSource::new());
        for level in 0..=2u8 {
            let n = 1 << level;
            for col in 0..n {
                for row in 0..n {
                    source.insert(TileCoord::new(col, row, level), vec![level]);
                }
            }
        }
        let dispatcher = layer.dispatcher(source.clone());

        layer.viewport_changed(schema.extent, level_resolution(&layer, 1));
        dispatcher.drain().await;

        let deeper = level_resolution(&layer, 2);
        layer.viewport_changed(schema.extent, deeper);
        let set = layer.get_features(&schema.extent, deeper);
        assert_eq!(set.len(), 16);
        assert!(set
            .tiles
            .iter()
            .all(|t| matches!(&t.imagery, TileImagery::Ancestor(p) if p.coord.level == 1)));
        assert_eq!(set.features().len(), 4);

        dispatcher.drain().await;
        let set = layer.get_features(&schema.extent, deeper);
        assert_eq!(set.exact_count(), 16);
    }

    /// Tiles are never handed out twice while in flight, whatever the viewport does
    #[test]
    fn test_interleaved_viewports_and_completions() {
        let layer = TileLayer::new("base", TileSchema::global_spherical_mercator()).unwrap();
        let schema = TileSchema::global_spherical_mercator();
        let resolution = level_resolution(&layer, 4);
        let left = Extent::new(-0.6 * H, -0.2 * H, -0.2 * H, 0.2 * H);
        let right = Extent::new(0.2 * H, -0.2 * H, 0.6 * H, 0.2 * H);

        layer.viewport_changed(left, resolution);
        let first = layer.get_fetch_jobs(0, 6);
        layer.viewport_changed(right, resolution);
        layer.viewport_changed(left, resolution);
        let second = layer.get_fetch_jobs(first.len(), 12);

        assert_eq!(first.len(), 6);
        assert!(second.len() <= 6);
        assert!(second.iter().all(|j| !first.iter().any(|f| f.coord == j.coord)));
        assert_eq!(layer.planner().pending_count(), first.len() + second.len());

        for job in first.iter().chain(second.iter()) {
            layer.on_fetch_completed(job.coord, Err(FetchError::new(job.coord, "offline")));
        }
        assert_eq!(layer.planner().pending_count(), 0);
        assert!(!layer.busy());
        assert!(schema.contains(&first[0].coord));
    }

    /// Busy flips on while visible tiles are fetched and off when they land
    #[tokio::test]
    async fn test_busy_events_bracket_fetching() {
        let layer = exact_layer();
        let events = layer.subscribe();
        let dispatcher = layer.dispatcher(Arc::new(MemoryTileSource::new()));

        layer.viewport_changed(top_half(), level_resolution(&layer, 1));
        dispatcher.drain().await;

        let busy: Vec<bool> = events
            .try_iter()
            .filter_map(|e| match e {
                LayerEvent::BusyChanged(busy) => Some(busy),
                _ => None,
            })
            .collect();
        assert_eq!(busy, vec![true, false]);
        assert!(!layer.busy());
    }
}
