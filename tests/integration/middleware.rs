//! HTTP middleware in front of a simulated handler.

use std::collections::HashMap;
use std::sync::Arc;

use http::{Request, Response, StatusCode};
use tokio_shedder::config::ShedderConfig;
use tokio_shedder::middleware::SheddingMiddleware;
use tokio_shedder::shedder::StatSnapshot;
use tokio_shedder::{AdaptiveShedder, Shedder, ShedderStat};

use crate::helpers::*;

fn request(path: &str) -> Request<()> {
    Request::builder().uri(path).body(()).unwrap()
}

fn ok() -> Response<String> {
    Response::new("ok".to_string())
}

#[test]
fn test_sheds_under_overload() {
    let env = TestEnv::new(100);
    let shedder = Arc::new(AdaptiveShedder::new(&env.ctx, fast_options()).unwrap());
    let stat = Arc::new(ShedderStat::new("api", env.ctx.clone()));
    let mw = SheddingMiddleware::new(shedder.clone(), stat.clone());

    // Long-running requests occupying the service
    let mut held: Vec<_> = (0..50).map(|_| shedder.allow().unwrap()).collect();
    for p in held.drain(..10) {
        p.fail();
    }

    let res = mw.handle(request("/a"), |_| ok());
    assert_eq!(res.status(), StatusCode::OK);

    env.cpu.set(950);
    let res = mw.handle(request("/b"), |_| ok());
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

    assert_eq!(
        stat.report(),
        StatSnapshot {
            total: 2,
            pass: 1,
            drop: 1
        }
    );
    drop(held);
    assert_eq!(shedder.flying(), 0);
}

#[test]
fn test_handle_async_with_tokio_test() {
    let env = TestEnv::new(0);
    let config = ShedderConfig::default();
    let mw = SheddingMiddleware::from_config("async", env.ctx.clone(), &config, false).unwrap();

    let res = tokio_test::block_on(mw.handle_async(request("/x"), |_| async { ok() }));
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(mw.stat().snapshot().pass, 1);
}

#[tokio::test]
async fn test_from_env_style_config() {
    let env = TestEnv::new(0);
    let src: HashMap<&str, &str> = HashMap::from([
        ("SHEDDER_WINDOW", "1s"),
        ("SHEDDER_BUCKETS", "10"),
        ("SHEDDER_CPU_THRESHOLD", "800"),
        ("SHEDDER_STAT_INTERVAL", "30s"),
    ]);
    let config = ShedderConfig::from_source(&src).unwrap();
    let mw = SheddingMiddleware::from_config("priority", env.ctx.clone(), &config, true).unwrap();

    assert!(!mw.shedder().is_noop());
    let res = mw
        .handle_async(request("/y"), |_| async { ok() })
        .await;
    assert_eq!(res.status(), StatusCode::OK);
}
