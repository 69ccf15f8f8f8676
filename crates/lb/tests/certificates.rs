use std::sync::Arc;
use std::time::Duration;

use ccm_core::{
    CcmError, Certificate, CertificateType, ForwardingRule, LoadBalancer, LoadBalancerConfig, ResourcesConfig,
    LOAD_BALANCER_ACTIVE,
};
use ccm_kubehub::{certificate_id, ANN_CERTIFICATE_ID, ANN_LOAD_BALANCER_ID, ANN_PROTOCOL};
use ccm_lb::LoadBalancers;
use ccm_store::Resources;
use ccm_testkit::{init_test_logging, FakeCloud, InMemoryServices, Op, ServiceBuilder};
use k8s_openapi::api::core::v1::Service;

const LB_ID: &str = "test-lb-id";
const LB_CERT: &str = "test-cert-id";
const SVC_CERT: &str = "service-cert-id";

#[derive(Clone, Copy, Debug)]
enum Method {
    Ensure,
    Update,
}

fn lb(cert: Option<&str>) -> LoadBalancer {
    let rule = match cert {
        Some(c) => ForwardingRule {
            entry_protocol: "https".into(),
            entry_port: 443,
            target_protocol: "http".into(),
            target_port: 30000,
            certificate_id: c.into(),
            tls_passthrough: false,
        },
        None => ForwardingRule {
            entry_protocol: "http".into(),
            entry_port: 443,
            target_protocol: "http".into(),
            target_port: 30000,
            ..Default::default()
        },
    };
    LoadBalancer {
        id: LB_ID.into(),
        name: "lb-name".into(),
        ip: "10.0.0.1".into(),
        status: LOAD_BALANCER_ACTIVE.into(),
        forwarding_rules: vec![rule],
        ..Default::default()
    }
}

fn service(cert: Option<&str>) -> Service {
    let b = ServiceBuilder::new(1)
        .load_balancer()
        .annotation(ANN_PROTOCOL, "http")
        .annotation(ANN_LOAD_BALANCER_ID, LB_ID)
        .port(443, 30000);
    match cert {
        Some(c) => b.annotation(ANN_CERTIFICATE_ID, c).build(),
        None => b.build(),
    }
}

struct Scenario {
    name: &'static str,
    lb_cert: Option<&'static str>,
    svc_cert: Option<&'static str>,
    certs: &'static [(&'static str, CertificateType)],
    expected_service_cert: Option<&'static str>,
    expected_lb_cert: Option<&'static str>,
    dangling: Option<&'static str>,
}

use CertificateType::{Custom, LetsEncrypt};

fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "tls not enabled",
            lb_cert: None,
            svc_cert: None,
            certs: &[],
            expected_service_cert: None,
            expected_lb_cert: None,
            dangling: None,
        },
        Scenario {
            name: "new certificate on plain load balancer",
            lb_cert: None,
            svc_cert: Some("cert-A"),
            certs: &[],
            expected_service_cert: Some("cert-A"),
            expected_lb_cert: Some("cert-A"),
            dangling: None,
        },
        Scenario {
            name: "[letsencrypt] ids match",
            lb_cert: Some(LB_CERT),
            svc_cert: Some(LB_CERT),
            certs: &[(LB_CERT, LetsEncrypt)],
            expected_service_cert: Some(LB_CERT),
            expected_lb_cert: Some(LB_CERT),
            dangling: None,
        },
        Scenario {
            name: "[letsencrypt] ids match, certificate missing",
            lb_cert: Some(LB_CERT),
            svc_cert: Some(LB_CERT),
            certs: &[],
            expected_service_cert: Some(LB_CERT),
            expected_lb_cert: Some(LB_CERT),
            dangling: Some(LB_CERT),
        },
        Scenario {
            name: "[letsencrypt] ids differ, both exist",
            lb_cert: Some(LB_CERT),
            svc_cert: Some(SVC_CERT),
            certs: &[(LB_CERT, LetsEncrypt), (SVC_CERT, LetsEncrypt)],
            expected_service_cert: Some(LB_CERT),
            expected_lb_cert: Some(LB_CERT),
            dangling: None,
        },
        Scenario {
            name: "[letsencrypt] service certificate missing",
            lb_cert: Some(LB_CERT),
            svc_cert: Some("meow"),
            certs: &[(LB_CERT, LetsEncrypt)],
            expected_service_cert: Some(LB_CERT),
            expected_lb_cert: Some(LB_CERT),
            dangling: None,
        },
        Scenario {
            name: "[letsencrypt] load balancer certificate missing",
            lb_cert: Some(LB_CERT),
            svc_cert: Some(SVC_CERT),
            certs: &[(SVC_CERT, LetsEncrypt)],
            expected_service_cert: Some(SVC_CERT),
            expected_lb_cert: Some(SVC_CERT),
            dangling: None,
        },
        Scenario {
            name: "[custom] ids match",
            lb_cert: Some(LB_CERT),
            svc_cert: Some(LB_CERT),
            certs: &[(LB_CERT, Custom)],
            expected_service_cert: Some(LB_CERT),
            expected_lb_cert: Some(LB_CERT),
            dangling: None,
        },
        Scenario {
            name: "[custom] ids match, certificate missing",
            lb_cert: Some(LB_CERT),
            svc_cert: Some(LB_CERT),
            certs: &[],
            expected_service_cert: Some(LB_CERT),
            expected_lb_cert: Some(LB_CERT),
            dangling: Some(LB_CERT),
        },
        Scenario {
            name: "[custom] ids differ, both exist",
            lb_cert: Some(LB_CERT),
            svc_cert: Some(SVC_CERT),
            certs: &[(LB_CERT, Custom), (SVC_CERT, Custom)],
            expected_service_cert: Some(SVC_CERT),
            expected_lb_cert: Some(SVC_CERT),
            dangling: None,
        },
        Scenario {
            name: "[custom] service certificate missing",
            lb_cert: Some(LB_CERT),
            svc_cert: Some(SVC_CERT),
            certs: &[(LB_CERT, Custom)],
            expected_service_cert: Some(SVC_CERT),
            expected_lb_cert: Some(LB_CERT),
            dangling: Some(SVC_CERT),
        },
        Scenario {
            name: "[custom] load balancer certificate missing",
            lb_cert: Some(LB_CERT),
            svc_cert: Some(SVC_CERT),
            certs: &[(SVC_CERT, Custom)],
            expected_service_cert: Some(SVC_CERT),
            expected_lb_cert: Some(SVC_CERT),
            dangling: None,
        },
        Scenario {
            name: "both certificates missing",
            lb_cert: Some(LB_CERT),
            svc_cert: Some(SVC_CERT),
            certs: &[],
            expected_service_cert: Some(SVC_CERT),
            expected_lb_cert: Some(LB_CERT),
            dangling: Some(SVC_CERT),
        },
    ]
}

async fn run(sc: &Scenario, method: Method) {
    let cloud = FakeCloud::new();
    cloud.insert_load_balancer(lb(sc.lb_cert));
    for (id, t) in sc.certs {
        cloud.insert_certificate(Certificate::new(id, *t));
    }
    let svc = service(sc.svc_cert);
    let services = InMemoryServices::new(vec![svc.clone()]);
    let resources = Arc::new(Resources::new(&ResourcesConfig::default(), cloud.client()));
    let config = LoadBalancerConfig {
        region: "nyc1".into(),
        active_timeout: Duration::from_secs(2),
        active_check_tick: Duration::from_secs(1),
    };
    let lbs = LoadBalancers::new(resources, services.clone(), config);

    let res = match method {
        Method::Ensure => lbs.ensure_load_balancer(&svc, &[]).await.map(|_| ()),
        Method::Update => lbs.update_load_balancer(&svc, &[]).await,
    };
    let ctx = format!("{} ({:?})", sc.name, method);
    match sc.dangling {
        Some(id) => assert_eq!(
            res,
            Err(CcmError::DanglingReference { annotation: ANN_CERTIFICATE_ID, id: id.to_string() }),
            "{}",
            ctx
        ),
        None => assert_eq!(res, Ok(()), "{}", ctx),
    }

    let stored = services.get("default/service1").expect("service stored");
    assert_eq!(certificate_id(&stored), sc.expected_service_cert, "service cert: {}", ctx);
    let live = cloud.load_balancer(LB_ID).expect("load balancer kept");
    assert_eq!(live.certificate_id(), sc.expected_lb_cert, "load balancer cert: {}", ctx);
    if sc.dangling.is_some() {
        assert_eq!(cloud.calls(Op::LoadBalancersUpdate), 0, "no update on error: {}", ctx);
        assert_eq!(services.patches(), 0, "no patch on error: {}", ctx);
    }
}

#[tokio::test(start_paused = true)]
async fn certificate_scenarios_on_ensure_and_update() {
    init_test_logging();
    for sc in scenarios() {
        for method in [Method::Ensure, Method::Update] {
            run(&sc, method).await;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn resolved_certificate_is_stable_across_passes() {
    let cloud = FakeCloud::new();
    cloud.insert_load_balancer(lb(Some(LB_CERT)));
    cloud.insert_certificate(Certificate::new(LB_CERT, LetsEncrypt));
    cloud.insert_certificate(Certificate::new(SVC_CERT, LetsEncrypt));
    let services = InMemoryServices::new(vec![service(Some(SVC_CERT))]);
    let resources = Arc::new(Resources::new(&ResourcesConfig::default(), cloud.client()));
    let lbs = LoadBalancers::new(resources, services.clone(), LoadBalancerConfig::default());

    for _ in 0..2 {
        let svc = services.get("default/service1").expect("service");
        lbs.ensure_load_balancer(&svc, &[]).await.expect("ensure");
    }
    let svc = services.get("default/service1").expect("service");
    assert_eq!(certificate_id(&svc), Some(LB_CERT));
    assert_eq!(cloud.load_balancer(LB_ID).and_then(|l| l.certificate_id().map(str::to_string)), Some(LB_CERT.to_string()));
    // only the first pass changed the annotation
    assert_eq!(services.patches(), 1);
}
