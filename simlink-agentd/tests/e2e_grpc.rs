// E2E tests for the gRPC bridge
//
// Boots the real tonic server on a free port against the sandbox world and
// drives all four service groups through the generated clients.

use simlink_agentd::adapters::engine::SandboxWorld;
use simlink_agentd::adapters::grpc::proto::agent_service_client::AgentServiceClient;
use simlink_agentd::adapters::grpc::proto::environment_service_client::EnvironmentServiceClient;
use simlink_agentd::adapters::grpc::proto::inventory_service_client::InventoryServiceClient;
use simlink_agentd::adapters::grpc::proto::player_control_service_client::PlayerControlServiceClient;
use simlink_agentd::adapters::grpc::proto::{
    self, CraftItemRequest, ExecuteActionRequest, GetInventoryRequest, GetStateRequest,
    HeartbeatRequest, ListActiveAgentsRequest, MoveItemRequest, RegisterAgentRequest,
    ScanRequest, StreamStateRequest, StreamUpdatesRequest, UnregisterAgentRequest,
};
use simlink_agentd::adapters::grpc::{AGENT_ID_HEADER, SESSION_TOKEN_HEADER};
use simlink_agentd::config::SimlinkConfig;
use simlink_agentd::ports::clock::SystemClock;
use simlink_agentd::SimlinkContext;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tonic::transport::Channel;
use tonic::{Code, Request};

struct Harness {
    context: Arc<SimlinkContext>,
    channel: Channel,
    stop: Option<oneshot::Sender<()>>,
    server: Option<JoinHandle<anyhow::Result<()>>>,
}

impl Harness {
    async fn start(config: SimlinkConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let context = Arc::new(
            SimlinkContext::start(
                config,
                Box::new(SandboxWorld::new()),
                Arc::new(SystemClock),
                None,
            )
            .unwrap(),
        );

        let (stop, stopped) = oneshot::channel::<()>();
        let serving = context.clone();
        let server = tokio::spawn(async move {
            serving
                .serve(listener, async move {
                    let _ = stopped.await;
                })
                .await
        });

        let channel = connect(&format!("http://{addr}")).await;
        Self {
            context,
            channel,
            stop: Some(stop),
            server: Some(server),
        }
    }

    fn agents(&self) -> AgentServiceClient<Channel> {
        AgentServiceClient::new(self.channel.clone())
    }

    fn environment(&self) -> EnvironmentServiceClient<Channel> {
        EnvironmentServiceClient::new(self.channel.clone())
    }

    fn player(&self) -> PlayerControlServiceClient<Channel> {
        PlayerControlServiceClient::new(self.channel.clone())
    }

    fn inventory(&self) -> InventoryServiceClient<Channel> {
        InventoryServiceClient::new(self.channel.clone())
    }

    async fn register(&self, agent_id: &str) -> String {
        self.agents()
            .register(RegisterAgentRequest {
                agent_id: agent_id.into(),
                agent_name: "E2E Bot".into(),
                agent_type: "scripted".into(),
                description: String::new(),
                capabilities: Default::default(),
                heartbeat_interval_ms: 1000,
            })
            .await
            .expect("register")
            .into_inner()
            .session_token
    }

    async fn stop(self) {
        let Harness {
            context,
            channel,
            stop,
            server,
        } = self;
        drop(channel);
        if let Some(stop) = stop {
            let _ = stop.send(());
        }
        if let Some(server) = server {
            timeout(Duration::from_secs(5), server)
                .await
                .expect("server stops after the signal")
                .unwrap()
                .unwrap();
        }
        let report = context.shutdown().await;
        assert!(report.worker_joined);
    }
}

async fn connect(uri: &str) -> Channel {
    let endpoint = Channel::from_shared(uri.to_string()).unwrap();
    let mut attempts = 0;
    loop {
        match endpoint.connect().await {
            Ok(channel) => return channel,
            Err(_) if attempts < 50 => {
                attempts += 1;
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Err(err) => panic!("bridge did not start listening on {uri}: {err}"),
        }
    }
}

fn authed<T>(message: T, agent_id: &str, token: &str) -> Request<T> {
    let mut request = Request::new(message);
    request
        .metadata_mut()
        .insert(AGENT_ID_HEADER, agent_id.parse().unwrap());
    request
        .metadata_mut()
        .insert(SESSION_TOKEN_HEADER, token.parse().unwrap());
    request
}

fn spawn_scan(radius: i32) -> ScanRequest {
    ScanRequest {
        center: Some(proto::Position {
            x: 0.5,
            y: 64.0,
            z: 0.5,
        }),
        radius,
        include_air_blocks: None,
        include_entities: Some(true),
        max_blocks: 0,
        max_entities: 0,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn e2e_agent_lifecycle() {
    let harness = Harness::start(SimlinkConfig::default()).await;
    let token = harness.register("bot1").await;
    assert_eq!(token.len(), 32);

    let mut agents = harness.agents();
    let duplicate = agents
        .register(RegisterAgentRequest {
            agent_id: "bot1".into(),
            agent_name: "Again".into(),
            agent_type: "scripted".into(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_eq!(duplicate.code(), Code::AlreadyExists);

    let heartbeat = agents
        .heartbeat(HeartbeatRequest {
            agent_id: "bot1".into(),
            session_token: token.clone(),
        })
        .await
        .unwrap()
        .into_inner();
    assert!(heartbeat.server_time.is_some());

    let listed = agents
        .list_active(ListActiveAgentsRequest {})
        .await
        .unwrap()
        .into_inner();
    assert_eq!(listed.agents.len(), 1);
    assert_eq!(listed.agents[0].heartbeat_interval_ms, 1000);

    agents
        .unregister(UnregisterAgentRequest {
            agent_id: "bot1".into(),
            session_token: token,
        })
        .await
        .unwrap();
    let listed = agents
        .list_active(ListActiveAgentsRequest {})
        .await
        .unwrap()
        .into_inner();
    assert!(listed.agents.is_empty());

    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn e2e_world_calls_require_a_session() {
    let harness = Harness::start(SimlinkConfig::default()).await;

    let status = harness
        .player()
        .get_state(GetStateRequest {})
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);

    let token = harness.register("bot1").await;
    let status = harness
        .player()
        .get_state(authed(GetStateRequest {}, "bot1", "not-the-token"))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);

    let state = harness
        .player()
        .get_state(authed(GetStateRequest {}, "bot1", &token))
        .await
        .unwrap()
        .into_inner()
        .state
        .unwrap();
    assert_eq!(state.player_name, "Steve");

    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn e2e_environment_scan_and_stream() {
    let harness = Harness::start(SimlinkConfig::default()).await;
    let token = harness.register("scout").await;
    let mut environment = harness.environment();

    let scan = environment
        .scan(authed(spawn_scan(5), "scout", &token))
        .await
        .unwrap()
        .into_inner()
        .scan
        .unwrap();
    assert_eq!(scan.radius, 5);
    assert_eq!(scan.dimension, "minecraft:overworld");
    assert!(scan.blocks.iter().all(|block| !block.is_air));
    assert_eq!(scan.entities.len(), 1);

    let too_far = environment
        .scan(authed(spawn_scan(1000), "scout", &token))
        .await
        .unwrap_err();
    assert_eq!(too_far.code(), Code::InvalidArgument);

    let mut stream = environment
        .stream_updates(authed(
            StreamUpdatesRequest {
                scan: Some(spawn_scan(2)),
                update_interval_ms: 100,
            },
            "scout",
            &token,
        ))
        .await
        .unwrap()
        .into_inner();
    for _ in 0..2 {
        let frame = timeout(Duration::from_secs(2), stream.message())
            .await
            .expect("frame in time")
            .unwrap()
            .unwrap();
        assert_eq!(frame.radius, 2);
    }
    drop(stream);

    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn e2e_player_and_inventory() {
    let harness = Harness::start(SimlinkConfig::default()).await;
    let token = harness.register("crafter").await;
    let mut player = harness.player();
    let mut inventory = harness.inventory();

    let moved = player
        .execute_action(authed(
            ExecuteActionRequest {
                action: proto::PlayerAction::MoveForward as i32,
                parameters: [("distance".to_string(), "2".to_string())].into(),
            },
            "crafter",
            &token,
        ))
        .await
        .unwrap()
        .into_inner();
    assert!(moved.success);
    let position = moved.new_state.unwrap().position.unwrap();
    assert!((position.z - 2.5).abs() < 1e-9);

    let unspecified = player
        .execute_action(authed(ExecuteActionRequest::default(), "crafter", &token))
        .await
        .unwrap_err();
    assert_eq!(unspecified.code(), Code::InvalidArgument);

    let crafted = inventory
        .craft_item(authed(
            CraftItemRequest {
                recipe_id: "oak_planks".into(),
                count: 0,
            },
            "crafter",
            &token,
        ))
        .await
        .unwrap()
        .into_inner()
        .crafted_item
        .unwrap();
    assert_eq!(crafted.item_id, "oak_planks");
    assert_eq!(crafted.count, 4);

    let empty = inventory
        .move_item(authed(
            MoveItemRequest {
                from_slot: 30,
                to_slot: 31,
                count: 1,
            },
            "crafter",
            &token,
        ))
        .await
        .unwrap_err();
    assert_eq!(empty.code(), Code::NotFound);

    let items = inventory
        .get_inventory(authed(GetInventoryRequest {}, "crafter", &token))
        .await
        .unwrap()
        .into_inner()
        .items;
    assert_eq!(items.len(), 36);
    assert_eq!(items[0].count, 15);

    let mut states = player
        .stream_state(authed(
            StreamStateRequest {
                update_interval_ms: 100,
            },
            "crafter",
            &token,
        ))
        .await
        .unwrap()
        .into_inner();
    let frame = timeout(Duration::from_secs(2), states.message())
        .await
        .expect("state frame in time")
        .unwrap()
        .unwrap();
    assert_eq!(frame.selected_slot, 0);
    drop(states);

    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn e2e_rate_limit_rejects_excess_calls() {
    let mut config = SimlinkConfig::default();
    config.security.requests_per_minute = 2;
    config.agent.enable_authentication = false;
    let harness = Harness::start(config).await;
    let mut player = harness.player();

    let mut request = || {
        let mut request = Request::new(GetStateRequest {});
        request
            .metadata_mut()
            .insert(AGENT_ID_HEADER, "greedy".parse().unwrap());
        request
    };
    player.get_state(request()).await.unwrap();
    player.get_state(request()).await.unwrap();
    let submitted = harness.context.dispatcher().stats().submitted;
    assert_eq!(submitted, 2);

    let status = player.get_state(request()).await.unwrap_err();
    assert_eq!(status.code(), Code::ResourceExhausted);
    assert_eq!(harness.context.dispatcher().stats().submitted, submitted);

    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn e2e_oversized_requests_never_reach_the_registry() {
    let mut config = SimlinkConfig::default();
    config.security.max_request_size_bytes = 512;
    let harness = Harness::start(config).await;
    let mut agents = harness.agents();

    let status = agents
        .register(RegisterAgentRequest {
            agent_id: "bloated".into(),
            agent_name: "Bloated".into(),
            agent_type: "scripted".into(),
            capabilities: [("notes".to_string(), "x".repeat(2048))].into(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::OutOfRange);
    assert!(harness.context.registry().is_empty());
    assert_eq!(harness.context.dispatcher().stats().submitted, 0);

    // a normal-sized registration on the same server still works
    harness.register("slim").await;
    assert_eq!(harness.context.registry().len(), 1);

    harness.stop().await;
}
