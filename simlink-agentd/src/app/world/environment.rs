use crate::app::dispatch::CommandDispatcher;
use crate::app::stream::{StreamManager, SubscriptionHandle, SubscriptionSpec};
use crate::config::EnvironmentConfig;
use crate::domain::world::{Block, BlockPos, Entity, Position};
use crate::error::{CoreError, CoreResult};
use crate::ports::engine::SimulationEngine;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScanRequest {
    pub center: Option<Position>,
    pub radius: u32,
    pub include_air_blocks: Option<bool>,
    pub include_entities: Option<bool>,
    pub max_blocks: u32,
    pub max_entities: u32,
}

/// A scan request with every default applied and every bound checked.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScanQuery {
    pub center: Position,
    pub radius: u32,
    pub include_air_blocks: bool,
    pub include_entities: bool,
    pub max_blocks: u32,
    pub max_entities: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnvironmentScan {
    pub query: ScanQuery,
    pub blocks: Vec<Block>,
    pub entities: Vec<Entity>,
    pub scan_time: DateTime<Utc>,
    pub dimension: String,
}

impl ScanQuery {
    /// Walks the cube around the center until `max_blocks` cells are
    /// collected, then gathers entities within the radius.
    pub fn run(&self, engine: &mut dyn SimulationEngine) -> CoreResult<EnvironmentScan> {
        engine.ensure_ready()?;
        let origin = scan_origin(self.center, self.radius)?;
        let r = self.radius as i32;
        let limit = self.max_blocks as usize;
        let mut blocks = Vec::new();

        'scan: for dx in -r..=r {
            for dy in -r..=r {
                for dz in -r..=r {
                    if blocks.len() >= limit {
                        break 'scan;
                    }
                    let Some(pos) = origin.offset(dx, dy, dz) else {
                        continue;
                    };
                    let block = engine.block_at(pos);
                    if self.include_air_blocks || !block.is_air {
                        blocks.push(block);
                    }
                }
            }
        }

        let entities = if self.include_entities {
            engine
                .entities_near(self.center, self.radius as f64)
                .into_iter()
                .take(self.max_entities as usize)
                .collect()
        } else {
            Vec::new()
        };

        Ok(EnvironmentScan {
            query: *self,
            blocks,
            entities,
            scan_time: Utc::now(),
            dimension: engine.dimension(),
        })
    }
}

fn scan_origin(center: Position, radius: u32) -> CoreResult<BlockPos> {
    center.block_within(radius).ok_or_else(|| {
        CoreError::invalid(format!(
            "position ({}, {}, {}) with radius {radius} is outside the addressable world",
            center.x, center.y, center.z
        ))
    })
}

pub struct EnvironmentService {
    dispatcher: Arc<CommandDispatcher>,
    streams: Arc<StreamManager>,
    limits: EnvironmentConfig,
}

impl EnvironmentService {
    pub fn new(
        dispatcher: Arc<CommandDispatcher>,
        streams: Arc<StreamManager>,
        limits: EnvironmentConfig,
    ) -> Self {
        Self {
            dispatcher,
            streams,
            limits,
        }
    }

    pub fn resolve(&self, request: &ScanRequest) -> CoreResult<ScanQuery> {
        let center = request
            .center
            .ok_or_else(|| CoreError::invalid("center position is required"))?;
        if !center.is_finite() {
            return Err(CoreError::invalid("center position must be finite"));
        }
        let radius = if request.radius == 0 {
            self.limits.default_radius
        } else {
            request.radius
        };
        if radius > self.limits.max_radius {
            return Err(CoreError::invalid(format!(
                "scan radius {radius} exceeds maximum {}",
                self.limits.max_radius
            )));
        }
        scan_origin(center, radius)?;
        let max_blocks = match request.max_blocks {
            0 => self.limits.max_blocks,
            n => n.min(self.limits.max_blocks),
        };
        let max_entities = match request.max_entities {
            0 => self.limits.max_entities,
            n => n.min(self.limits.max_entities),
        };
        Ok(ScanQuery {
            center,
            radius,
            include_air_blocks: request
                .include_air_blocks
                .unwrap_or(self.limits.include_air_blocks),
            include_entities: request
                .include_entities
                .unwrap_or(self.limits.include_entities),
            max_blocks,
            max_entities,
        })
    }

    pub async fn scan(&self, request: &ScanRequest) -> CoreResult<EnvironmentScan> {
        let query = self.resolve(request)?;
        self.dispatcher.execute(move |engine| query.run(engine)).await
    }

    /// Interval 0 means the configured default; the stream manager enforces
    /// the lower bound.
    pub fn stream_updates(
        &self,
        request: &ScanRequest,
        interval_ms: u64,
        sink: mpsc::Sender<CoreResult<EnvironmentScan>>,
    ) -> CoreResult<SubscriptionHandle> {
        let query = self.resolve(request)?;
        let interval_ms = if interval_ms == 0 {
            self.limits.update_interval_ms
        } else {
            interval_ms
        };
        self.streams.subscribe(
            SubscriptionSpec::new("environment", Duration::from_millis(interval_ms)),
            move |engine| query.run(engine),
            sink,
        )
    }

    pub async fn block_info(&self, position: Option<Position>) -> CoreResult<Block> {
        let position = position.ok_or_else(|| CoreError::invalid("position is required"))?;
        if !position.is_finite() {
            return Err(CoreError::invalid("position must be finite"));
        }
        let cell = scan_origin(position, 0)?;
        self.dispatcher
            .execute(move |engine| {
                engine.ensure_ready()?;
                Ok(engine.block_at(cell))
            })
            .await
    }

    pub async fn entity_info(&self, entity_id: &str) -> CoreResult<Entity> {
        let entity_id = entity_id.trim().to_string();
        if entity_id.is_empty() {
            return Err(CoreError::invalid("entity_id is required"));
        }
        self.dispatcher
            .execute(move |engine| {
                engine.ensure_ready()?;
                engine
                    .entity(&entity_id)
                    .ok_or_else(|| CoreError::NotFound(format!("entity {entity_id} not found")))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::engine::SandboxWorld;
    use crate::app::dispatch::DispatcherOptions;

    fn service() -> EnvironmentService {
        let dispatcher = Arc::new(
            CommandDispatcher::start(
                Box::new(SandboxWorld::new()),
                DispatcherOptions::default(),
                None,
            )
            .unwrap(),
        );
        let streams = Arc::new(StreamManager::new(dispatcher.clone(), None));
        EnvironmentService::new(dispatcher, streams, EnvironmentConfig::default())
    }

    fn at_spawn(radius: u32) -> ScanRequest {
        ScanRequest {
            center: Some(Position::new(0.5, 64.0, 0.5)),
            radius,
            ..ScanRequest::default()
        }
    }

    #[tokio::test]
    async fn resolve_applies_defaults_and_bounds() {
        let service = service();
        let query = service.resolve(&at_spawn(0)).unwrap();
        assert_eq!(query.radius, 16);
        assert_eq!(query.max_blocks, 10_000);
        assert!(!query.include_air_blocks);
        assert!(query.include_entities);

        assert!(matches!(
            service.resolve(&at_spawn(65)),
            Err(CoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            service.resolve(&ScanRequest::default()),
            Err(CoreError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn scan_skips_air_and_respects_block_cap() {
        let service = service();
        let mut request = at_spawn(2);
        request.max_blocks = 10;
        let scan = service.scan(&request).await.unwrap();
        assert_eq!(scan.blocks.len(), 10);
        assert!(scan.blocks.iter().all(|block| !block.is_air));
        assert_eq!(scan.dimension, "minecraft:overworld");
    }

    #[tokio::test]
    async fn scan_with_air_counts_every_cell() {
        let service = service();
        let mut request = at_spawn(1);
        request.include_air_blocks = Some(true);
        request.include_entities = Some(false);
        let scan = service.scan(&request).await.unwrap();
        assert_eq!(scan.blocks.len(), 27);
        assert!(scan.entities.is_empty());
    }

    #[tokio::test]
    async fn entities_limited_by_radius_and_cap() {
        let service = service();
        let mut request = at_spawn(10);
        let scan = service.scan(&request).await.unwrap();
        assert_eq!(scan.entities.len(), 2);
        request.max_entities = 1;
        let scan = service.scan(&request).await.unwrap();
        assert_eq!(scan.entities.len(), 1);
    }

    #[tokio::test]
    async fn entity_lookup_errors() {
        let service = service();
        assert!(matches!(
            service.entity_info(" ").await,
            Err(CoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            service.entity_info("ghost").await,
            Err(CoreError::NotFound(_))
        ));
        assert_eq!(service.entity_info("entity-2").await.unwrap().name, "Zombie");
    }

    #[tokio::test]
    async fn positions_outside_the_world_are_rejected() {
        let service = service();
        let mut request = at_spawn(1);
        request.center = Some(Position::new(2147483647.0, 64.0, 0.0));
        assert!(matches!(
            service.scan(&request).await,
            Err(CoreError::InvalidArgument(_))
        ));
        request.center = Some(Position::new(0.0, 64.0, -2147483648.0));
        assert!(matches!(
            service.resolve(&request),
            Err(CoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            service.block_info(Some(Position::new(1e12, 64.0, 0.0))).await,
            Err(CoreError::InvalidArgument(_))
        ));
        assert_eq!(service.dispatcher.stats().submitted, 0);
        assert_eq!(service.dispatcher.stats().faulted, 0);

        let edge = service
            .block_info(Some(Position::new(2147483647.5, 64.0, 0.0)))
            .await
            .unwrap();
        assert_eq!(edge.pos.x, i32::MAX);
    }

    #[tokio::test]
    async fn block_info_reads_placed_blocks() {
        let service = service();
        let block = service
            .block_info(Some(Position::new(5.2, 63.9, 5.7)))
            .await
            .unwrap();
        assert_eq!(block.id, "water");
        assert!(service.block_info(None).await.is_err());
    }

    #[tokio::test]
    async fn stream_emits_scans() {
        let service = service();
        let (tx, mut rx) = mpsc::channel(4);
        let handle = service.stream_updates(&at_spawn(1), 100, tx).unwrap();
        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(first.query.radius, 1);
        let second = rx.recv().await.unwrap().unwrap();
        assert!(second.scan_time >= first.scan_time);
        handle.cancel();
    }
}
