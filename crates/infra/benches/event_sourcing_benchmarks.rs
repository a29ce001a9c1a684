use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::Utc;
use ledger_accounting::{
    Account, AccountCommand, AccountKind, CreateAccount, FieldChange, UpdateAccount,
};
use ledger_core::{AggregateId, ExpectedVersion, TenantId};
use ledger_events::{EventEnvelope, InMemoryEventBus};
use ledger_infra::command_dispatcher::{idempotency_key, CommandContext, CommandDispatcher};
use ledger_infra::event_store::{EventDraft, EventOrigin, EventStore, InMemoryEventStore, PayloadStorage};
use ledger_infra::payload::InMemoryPayloadStore;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

/// Naive CRUD simulation: direct key-value updates (no events, no history).
#[derive(Debug, Clone)]
struct NaiveCrudStore {
    inner: Arc<RwLock<HashMap<(TenantId, AggregateId), CrudState>>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CrudState {
    name: String,
    version: u64,
}

impl NaiveCrudStore {
    fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn create(&self, tenant_id: TenantId, account_id: AggregateId, name: String) {
        let mut map = self.inner.write().unwrap();
        map.insert((tenant_id, account_id), CrudState { name, version: 1 });
    }

    fn rename(&self, tenant_id: TenantId, account_id: AggregateId, name: String) -> Result<(), ()> {
        let mut map = self.inner.write().unwrap();
        if let Some(state) = map.get_mut(&(tenant_id, account_id)) {
            state.name = name;
            state.version += 1;
            Ok(())
        } else {
            Err(())
        }
    }
}

fn setup_event_sourcing() -> (
    CommandDispatcher<
        InMemoryEventStore,
        Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>,
        InMemoryPayloadStore,
    >,
    TenantId,
) {
    let store = InMemoryEventStore::new();
    let bus: Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>> =
        Arc::new(InMemoryEventBus::new());
    let dispatcher = CommandDispatcher::new(store, bus, InMemoryPayloadStore::new());
    let tenant_id = TenantId::new();
    (dispatcher, tenant_id)
}

fn create_account_cmd(tenant_id: TenantId, account_id: AggregateId, code: &str) -> AccountCommand {
    AccountCommand::Create(CreateAccount {
        tenant_id,
        account_id,
        code: code.to_string(),
        name: "Test Account".to_string(),
        name_ar: String::new(),
        kind: AccountKind::Asset,
        description: String::new(),
        description_ar: String::new(),
        unit_of_measure: String::new(),
        parent_public_id: None,
        is_header: false,
        occurred_at: Utc::now(),
    })
}

fn rename_account_cmd(tenant_id: TenantId, account_id: AggregateId, name: &str) -> AccountCommand {
    let mut changes = BTreeMap::new();
    changes.insert(
        "name".to_string(),
        FieldChange {
            old: None,
            new: Some(name.to_string()),
        },
    );
    AccountCommand::Update(UpdateAccount {
        tenant_id,
        account_id,
        changes,
        occurred_at: Utc::now(),
    })
}

fn bench_command_execution_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_execution_latency");
    group.sample_size(1000);

    // Benchmark: CreateAccount command (first command, no history)
    group.bench_function("create_account_fresh", |b| {
        let (dispatcher, tenant_id) = setup_event_sourcing();
        b.iter(|| {
            let account_id = AggregateId::new();
            let cmd = create_account_cmd(tenant_id, account_id, black_box("1000"));
            let ctx = CommandContext::new(tenant_id, EventOrigin::Api);
            let key = idempotency_key("account.create", &account_id).unwrap();
            dispatcher
                .dispatch::<Account>(&ctx, account_id, "account", cmd, key, Account::empty)
                .unwrap();
        });
    });

    // Benchmark: UpdateAccount command after creation (with history)
    group.bench_function("update_account_with_history", |b| {
        let (dispatcher, tenant_id) = setup_event_sourcing();
        let account_id = AggregateId::new();
        let ctx = CommandContext::new(tenant_id, EventOrigin::Api);

        dispatcher
            .dispatch::<Account>(
                &ctx,
                account_id,
                "account",
                create_account_cmd(tenant_id, account_id, "1000"),
                idempotency_key("account.create", &account_id).unwrap(),
                Account::empty,
            )
            .unwrap();

        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            let cmd = rename_account_cmd(tenant_id, account_id, black_box("Renamed"));
            let key = idempotency_key("account.update", &(account_id, i)).unwrap();
            dispatcher
                .dispatch::<Account>(&ctx, account_id, "account", cmd, key, Account::empty)
                .unwrap();
        });
    });

    group.finish();
}

fn bench_event_append_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_append_throughput");
    group.throughput(Throughput::Elements(1));

    for batch_size in [1, 10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::new("sequential_append", batch_size),
            batch_size,
            |b, &size| {
                let store = InMemoryEventStore::new();
                let tenant_id = TenantId::new();
                let account_id = AggregateId::new();

                b.iter(|| {
                    let mut expected = ExpectedVersion::Any;
                    for i in 0..size {
                        let payload = serde_json::json!({"seq": i});
                        let draft = EventDraft {
                            tenant_id,
                            aggregate_id: account_id,
                            aggregate_type: "account".to_string(),
                            event_type: "account.updated".to_string(),
                            schema_version: 1,
                            payload_hash: ledger_core::compute_payload_hash(&payload),
                            inline_data: payload,
                            payload_storage: PayloadStorage::Inline,
                            payload_ref: None,
                            idempotency_key: format!("bench:{}:{i}", uuid::Uuid::now_v7()),
                            origin: EventOrigin::System,
                            caused_by_user_id: None,
                            caused_by_event_id: None,
                            occurred_at: Utc::now(),
                            metadata: BTreeMap::new(),
                        };
                        let committed = black_box(store.append(draft, expected).unwrap());
                        expected = ExpectedVersion::Exact(committed.aggregate_sequence);
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_stream_replay_speed(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_replay_speed");

    for event_count in [10, 100, 1000, 10000].iter() {
        group.bench_with_input(
            BenchmarkId::new("load_stream", event_count),
            event_count,
            |b, &count| {
                let store = InMemoryEventStore::new();
                let tenant_id = TenantId::new();
                let account_id = AggregateId::new();

                let mut expected = ExpectedVersion::Any;
                for i in 0..count {
                    let payload = serde_json::json!({"seq": i});
                    let draft = EventDraft {
                        tenant_id,
                        aggregate_id: account_id,
                        aggregate_type: "account".to_string(),
                        event_type: "account.updated".to_string(),
                        schema_version: 1,
                        payload_hash: ledger_core::compute_payload_hash(&payload),
                        inline_data: payload,
                        payload_storage: PayloadStorage::Inline,
                        payload_ref: None,
                        idempotency_key: format!("bench-replay:{}:{i}", uuid::Uuid::now_v7()),
                        origin: EventOrigin::System,
                        caused_by_user_id: None,
                        caused_by_event_id: None,
                        occurred_at: Utc::now(),
                        metadata: BTreeMap::new(),
                    };
                    let committed = store.append(draft, expected).unwrap();
                    expected = ExpectedVersion::Exact(committed.aggregate_sequence);
                }

                b.iter(|| {
                    black_box(store.load_stream(tenant_id, account_id).unwrap());
                });
            },
        );
    }

    group.finish();
}

fn bench_event_sourcing_vs_naive_crud(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_sourcing_vs_naive_crud");
    group.sample_size(1000);

    // Benchmark: Event sourcing (create + rename)
    group.bench_function("event_sourcing_create_and_update", |b| {
        let (dispatcher, tenant_id) = setup_event_sourcing();
        let ctx = CommandContext::new(tenant_id, EventOrigin::Api);

        b.iter(|| {
            let account_id = AggregateId::new();
            dispatcher
                .dispatch::<Account>(
                    &ctx,
                    account_id,
                    "account",
                    create_account_cmd(tenant_id, account_id, "1000"),
                    idempotency_key("account.create", &account_id).unwrap(),
                    Account::empty,
                )
                .unwrap();

            dispatcher
                .dispatch::<Account>(
                    &ctx,
                    account_id,
                    "account",
                    rename_account_cmd(tenant_id, account_id, "Renamed"),
                    idempotency_key("account.update", &account_id).unwrap(),
                    Account::empty,
                )
                .unwrap();
        });
    });

    // Benchmark: Naive CRUD (create + rename)
    group.bench_function("naive_crud_create_and_update", |b| {
        let store = NaiveCrudStore::new();
        let tenant_id = TenantId::new();

        b.iter(|| {
            let account_id = AggregateId::new();
            store.create(tenant_id, account_id, "Test Account".to_string());
            store.rename(tenant_id, account_id, "Renamed".to_string()).unwrap();
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_command_execution_latency,
    bench_event_append_throughput,
    bench_stream_replay_speed,
    bench_event_sourcing_vs_naive_crud
);
criterion_main!(benches);
