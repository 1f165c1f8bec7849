use std::time::Duration;

use serde_json::json;
use xnet::{connect, ControlInfo, DomainEvent, DomainHandler, Node, Runtime, Step};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("=== xnet runtime ===\n");

    let runtime = Runtime::new();
    println!(
        "[OK] domain {} (run {})",
        runtime.domain().id(),
        runtime.domain().run_id()
    );

    runtime.on(
        DomainEvent::UncaughtNodeError,
        DomainHandler::uncaught_node_error(|err| {
            println!("[WARN] uncaught: {}", err);
            true
        }),
    );

    // source -> scale (subnet: double -> offset) -> delay -> sink
    let source = Node::new(&runtime, json!(null), |console, data| {
        for item in data.as_array().into_iter().flatten() {
            console.emit("$O", item.clone())?;
        }
        Ok(Step::Done)
    })?;
    source.set_brand("Source");

    let scale = Node::subnet(&runtime, json!(null), |scope| {
        let runtime = scope.runtime();
        let double = Node::new(runtime, json!(null), |console, data| {
            let n = data.as_i64().ok_or_else(|| anyhow::anyhow!("not a number: {}", data))?;
            console.emit("$O", json!(n * 2))?;
            Ok(Step::Done)
        })?;
        double.set_brand("Double");
        let offset = Node::new(runtime, json!(null), |console, data| {
            console.emit("$O", json!(data.as_i64().unwrap_or(0) + 1))?;
            Ok(Step::Done)
        })?;
        offset.set_brand("Offset");
        scope.add_child(&double);
        scope.add_child(&offset);

        connect(&scope.inner_port("$I", None)?, &double.port("$I")?)?;
        connect(&double.port("$O")?, &offset.port("$I")?)?;
        connect(&offset.port("$O")?, &scope.inner_port("$O", None)?)?;
        Ok(())
    })?;
    scale.set_brand("Scale");

    let delay = Node::new(&runtime, json!(null), |console, data| {
        let console = console.clone();
        let data = data.clone();
        Ok(Step::pending(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            console.emit("$O", data)?;
            Ok(())
        }))
    })?;
    delay.set_brand("Delay");

    let sink = Node::new(&runtime, json!([]), |console, data| {
        console.update_state(|state| {
            if let Some(items) = state.as_array_mut() {
                items.push(data.clone());
            }
        });
        Ok(Step::Done)
    })?;
    sink.set_brand("Sink");

    connect(&source.port("$O")?, &scale.port("$I")?)?;
    connect(&scale.port("$O")?, &delay.port("$I")?)?;
    connect(&delay.port("$O")?, &sink.port("$I")?)?;
    println!("[OK] graph wired ({} node cores)", runtime.core_count());

    let activation = source.invoke(json!([1, 2, 3, "x"]))?;
    println!("[OK] source activation pending: {}", activation.is_pending());
    let summary = activation.await;
    println!(
        "[OK] activation {} stages {:?} failures {}",
        summary.id, summary.stages, summary.failures
    );
    println!(
        "[OK] sink state before delays finish: {} ({} deliveries in flight)",
        sink.state(),
        runtime.pending_deliveries()
    );
    runtime.settle().await;
    println!("[OK] sink state: {}", sink.state());

    let direct = scale.activate(json!(5), ControlInfo::with_port(scale.port("$I")?));
    direct.await;
    runtime.settle().await;
    println!("[OK] after direct activation: {}", sink.state());

    for (name, state) in scale.ports_state() {
        println!(
            "     port {} {:?} outer={} inner={}",
            name, state.direction, state.outer_link_num, state.inner_link_num
        );
    }

    Ok(())
}
