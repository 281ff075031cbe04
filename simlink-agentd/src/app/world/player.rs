use crate::app::dispatch::CommandDispatcher;
use crate::app::stream::{StreamManager, SubscriptionHandle, SubscriptionSpec};
use crate::config::PlayerConfig;
use crate::domain::world::{ActionCommand, ActionTable, PlayerAction, PlayerState, Position};
use crate::error::{CoreError, CoreResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// One requested action. `action` is `None` when the caller left it
/// unspecified.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ActionRequest {
    pub action: Option<PlayerAction>,
    pub parameters: HashMap<String, String>,
}

impl ActionRequest {
    pub fn new(action: PlayerAction) -> Self {
        Self {
            action: Some(action),
            parameters: HashMap::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl ToString) -> Self {
        self.parameters.insert(key.to_string(), value.to_string());
        self
    }

    fn validate(&self) -> CoreResult<(PlayerAction, ActionCommand)> {
        let action = self
            .action
            .ok_or_else(|| CoreError::invalid("action must be specified"))?;
        let command = ActionCommand::parse(action, &self.parameters).map_err(CoreError::invalid)?;
        Ok((action, command))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ActionOutcome {
    pub success: bool,
    pub state: PlayerState,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StepResult {
    pub action: PlayerAction,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SequenceOutcome {
    pub results: Vec<StepResult>,
    pub final_state: Option<PlayerState>,
}

impl SequenceOutcome {
    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|result| result.success)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MoveRequest {
    pub target: Option<Position>,
    pub speed: f64,
    pub pathfind: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MoveOutcome {
    pub distance: f64,
    pub speed: f64,
    pub state: PlayerState,
}

pub struct PlayerService {
    dispatcher: Arc<CommandDispatcher>,
    streams: Arc<StreamManager>,
    actions: ActionTable,
    limits: PlayerConfig,
}

impl PlayerService {
    pub fn new(
        dispatcher: Arc<CommandDispatcher>,
        streams: Arc<StreamManager>,
        limits: PlayerConfig,
    ) -> Self {
        Self::with_actions(dispatcher, streams, limits, ActionTable::standard())
    }

    pub fn with_actions(
        dispatcher: Arc<CommandDispatcher>,
        streams: Arc<StreamManager>,
        limits: PlayerConfig,
        actions: ActionTable,
    ) -> Self {
        Self {
            dispatcher,
            streams,
            actions,
            limits,
        }
    }

    pub async fn execute_action(&self, request: &ActionRequest) -> CoreResult<ActionOutcome> {
        let (action, command) = request.validate()?;
        let handler = self
            .actions
            .handler(action)
            .ok_or_else(|| CoreError::Unimplemented(format!("no handler for {action}")))?;
        self.dispatcher
            .execute(move |engine| {
                let player = engine.ready_player_mut()?;
                let success = handler(player, &command);
                debug!(%action, success, "player action executed");
                Ok(ActionOutcome {
                    success,
                    state: player.clone(),
                })
            })
            .await
    }

    /// Runs each step as its own engine task, sleeping between steps on the
    /// caller's task. A step that fails is recorded and the sequence goes on.
    pub async fn execute_sequence(
        &self,
        steps: &[ActionRequest],
        delay_ms: u64,
    ) -> CoreResult<SequenceOutcome> {
        if steps.is_empty() {
            return Err(CoreError::invalid("at least one action is required"));
        }
        let mut validated = Vec::with_capacity(steps.len());
        for step in steps {
            validated.push(step.validate()?);
        }
        let delay = self.clamp_delay(delay_ms);

        let mut results = Vec::with_capacity(validated.len());
        let mut final_state = None;
        for (index, (action, _)) in validated.iter().enumerate() {
            if index > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match self.execute_action(&steps[index]).await {
                Ok(outcome) => {
                    results.push(StepResult {
                        action: *action,
                        success: outcome.success,
                        error: None,
                    });
                    final_state = Some(outcome.state);
                }
                Err(err) if err.is_retryable() => {
                    warn!(%action, error = %err, "sequence step could not run");
                    results.push(StepResult {
                        action: *action,
                        success: false,
                        error: Some(err.to_string()),
                    });
                }
                Err(err) => return Err(err),
            }
        }
        Ok(SequenceOutcome {
            results,
            final_state,
        })
    }

    fn clamp_delay(&self, delay_ms: u64) -> Duration {
        if delay_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(
            delay_ms.clamp(self.limits.min_action_delay_ms, self.limits.max_action_delay_ms),
        )
    }

    pub async fn state(&self) -> CoreResult<PlayerState> {
        self.dispatcher
            .execute(|engine| Ok(engine.ready_player()?.clone()))
            .await
    }

    pub fn stream_state(
        &self,
        interval_ms: u64,
        sink: mpsc::Sender<CoreResult<PlayerState>>,
    ) -> CoreResult<SubscriptionHandle> {
        let interval_ms = if interval_ms == 0 {
            self.limits.state_update_interval_ms
        } else {
            interval_ms
        };
        self.streams.subscribe(
            SubscriptionSpec::new("player_state", Duration::from_millis(interval_ms)),
            |engine| Ok(engine.ready_player()?.clone()),
            sink,
        )
    }

    pub async fn move_to(&self, request: &MoveRequest) -> CoreResult<MoveOutcome> {
        let target = request
            .target
            .ok_or_else(|| CoreError::invalid("target_position is required"))?;
        if !target.is_finite() {
            return Err(CoreError::invalid("target_position must be finite"));
        }
        if !request.speed.is_finite() || request.speed < 0.0 {
            return Err(CoreError::invalid("speed must be a non-negative number"));
        }
        let speed = if request.speed == 0.0 {
            self.limits.default_move_speed
        } else {
            request.speed
        };
        if speed > self.limits.max_move_speed {
            return Err(CoreError::invalid(format!(
                "speed {speed} exceeds maximum {}",
                self.limits.max_move_speed
            )));
        }
        let max_range = self.limits.max_pathfinding_range;
        let pathfind = request.pathfind && self.limits.enable_pathfinding;

        self.dispatcher
            .execute(move |engine| {
                let pathfinding = engine.pathfinding_available();
                let player = engine.ready_player_mut()?;
                let distance = player.position.distance_to(&target);
                if distance > max_range {
                    return Err(CoreError::invalid(format!(
                        "target is {distance:.1} blocks away, beyond range {max_range}"
                    )));
                }
                if pathfind && !pathfinding {
                    warn!("pathfinding unavailable, moving directly");
                }
                player.position = target;
                Ok(MoveOutcome {
                    distance,
                    speed,
                    state: player.clone(),
                })
            })
            .await
    }
}
