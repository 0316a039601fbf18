use nepse_scraper::models::outcome::{ExhaustReason, FailureReason, Outcome};
use nepse_scraper::scrapers::locator::Strategy;
use nepse_scraper::session::replay::ReplayFactory;
use nepse_scraper::{BatchService, CancelFlag, Config, ExtractionEngine, ExtractionRequest};
use std::sync::{Arc, Mutex};

const LANDING_WITH_ID: &str = r##"<html><body>
    <a id="ctl00_ContentPlaceHolder1_CompanyDetail1_lnkHistoryTab" href="#">Price History</a>
</body></html>"##;

const LANDING_TEXT_ONLY: &str = r##"<html><body>
    <ul class="nav"><li><a href="#0">Summary</a></li><li><a href="#1">Price History</a></li></ul>
</body></html>"##;

const LANDING_WITHOUT_HISTORY: &str = r##"<html><body><a href="#0">Summary</a></body></html>"##;

/// A history page whose rows are numbered `first..first + count`, linking to
/// the given page numbers.
fn history_page(first: usize, count: usize, links: &[u32]) -> String {
    let mut html = String::from(
        "<html><body><table class=\"table table-bordered table-striped\">\
         <tr><th>#</th><th>Date</th><th>LTP</th><th>% Change</th><th>High</th>\
         <th>Low</th><th>Open</th><th>Qty.</th><th>Turnover</th></tr>",
    );
    for n in first..first + count {
        html.push_str(&format!(
            "<tr><td>{}</td><td>2024/01/{:02}</td><td>{}.00</td><td>0.5</td><td>1</td>\
             <td>1</td><td>1</td><td>100</td><td>1,000.00</td></tr>",
            n,
            (n % 28) + 1,
            500 + n
        ));
    }
    html.push_str("</table><div class=\"pager\">");
    for link in links {
        html.push_str(&format!("<a title=\"Page {}\" href=\"#\">{}</a>", link, link));
    }
    html.push_str("</div></body></html>");
    html
}

fn engine(factory: &ReplayFactory) -> ExtractionEngine {
    ExtractionEngine::new(Config::new().without_waits(), Arc::new(factory.clone())).unwrap()
}

fn first_cells(outcome: &Outcome) -> Vec<String> {
    outcome
        .records()
        .iter()
        .map(|r| r.get(0).unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn stops_mid_page_once_the_quota_is_met() {
    let factory = ReplayFactory::new(
        LANDING_WITH_ID,
        [
            history_page(1, 10, &[2, 3]),
            history_page(11, 10, &[1, 3]),
            history_page(21, 10, &[1, 2]),
        ],
    );
    let request = ExtractionRequest::new("NTC", 12).unwrap();

    let outcome = engine(&factory).run(&request).await;

    assert!(matches!(outcome, Outcome::Success(_)));
    let expected: Vec<String> = (1..=12).map(|n| n.to_string()).collect();
    assert_eq!(first_cells(&outcome), expected);

    let stats = factory.stats().snapshot();
    assert!(stats.navigations[0].ends_with("symbol=NTC"));
    assert!(!stats.lookups.contains(&Strategy::LinkTitle("Page 3".into())));
    assert_eq!(stats.closes, 1);
}

#[tokio::test]
async fn missing_next_page_is_a_successful_partial_result() {
    let factory = ReplayFactory::new(
        LANDING_WITH_ID,
        [history_page(1, 4, &[2]), history_page(5, 4, &[1])],
    );
    let request = ExtractionRequest::new("NTC", 20).unwrap();

    let outcome = engine(&factory).run(&request).await;

    assert_eq!(outcome.records().len(), 8);
    assert!(matches!(
        outcome,
        Outcome::PartialSuccess {
            reason: ExhaustReason::NoPageControl(3),
            ..
        }
    ));
    assert!(!outcome.is_failure());
    assert_eq!(factory.stats().snapshot().closes, 1);
}

#[tokio::test]
async fn quota_truncates_an_oversized_page() {
    let factory = ReplayFactory::new(
        LANDING_WITH_ID,
        [history_page(1, 20, &[2]), history_page(21, 30, &[1, 3])],
    );
    let request = ExtractionRequest::new("NTC", 25).unwrap();

    let outcome = engine(&factory).run(&request).await;

    assert!(matches!(outcome, Outcome::Success(_)));
    assert_eq!(outcome.records().len(), 25);
    assert_eq!(outcome.records()[24].get(0), Some("25"));
}

#[tokio::test]
async fn history_control_falls_back_to_link_text() {
    let factory = ReplayFactory::new(LANDING_TEXT_ONLY, [history_page(1, 3, &[])]);
    let request = ExtractionRequest::new("NABIL", 3).unwrap();

    let outcome = engine(&factory).run(&request).await;

    assert_eq!(first_cells(&outcome), vec!["1", "2", "3"]);
    let lookups = factory.stats().snapshot().lookups;
    assert_eq!(
        &lookups[..2],
        &[
            Strategy::ElementId("ctl00_ContentPlaceHolder1_CompanyDetail1_lnkHistoryTab".into()),
            Strategy::LinkText("Price History".into()),
        ]
    );
}

#[tokio::test]
async fn missing_history_control_fails_and_closes_once() {
    let factory = ReplayFactory::new(LANDING_WITHOUT_HISTORY, [history_page(1, 3, &[])]);
    let request = ExtractionRequest::new("NTC", 5).unwrap();

    let outcome = engine(&factory).run(&request).await;

    assert_eq!(
        outcome,
        Outcome::Failure {
            records: Vec::new(),
            reason: FailureReason::HistoryControlNotFound,
        }
    );
    let stats = factory.stats().snapshot();
    assert_eq!(stats.closes, 1);
    assert_eq!(stats.clicks, 0);
}

#[tokio::test]
async fn session_crash_keeps_rows_and_still_closes() {
    // Click 1 opens the history view, click 2 goes to page 2.
    let factory = ReplayFactory::new(
        LANDING_WITH_ID,
        [history_page(1, 6, &[2]), history_page(7, 6, &[1, 3])],
    )
    .fail_on_click(2);
    let request = ExtractionRequest::new("NTC", 50).unwrap();

    let outcome = engine(&factory).run(&request).await;

    assert!(outcome.is_failure());
    assert_eq!(outcome.records().len(), 6);
    assert!(matches!(
        outcome,
        Outcome::Failure {
            reason: FailureReason::Session { page: 2, .. },
            ..
        }
    ));
    assert_eq!(factory.stats().snapshot().closes, 1);
}

#[tokio::test]
async fn cancellation_between_pages_aborts_with_partial_rows() {
    let factory = ReplayFactory::new(
        LANDING_WITH_ID,
        [history_page(1, 5, &[2]), history_page(6, 5, &[1, 3])],
    );
    let request = ExtractionRequest::new("NTC", 50).unwrap();
    let cancel = CancelFlag::new();
    let trigger = cancel.clone();
    let progress = Arc::new(move |rows: usize, _quota: usize| {
        if rows >= 5 {
            trigger.cancel();
        }
    });

    let outcome = engine(&factory).run_with(&request, progress, cancel).await;

    assert_eq!(outcome.records().len(), 5);
    assert_eq!(outcome.reason().as_deref(), Some("cancelled before page 2"));
    assert_eq!(factory.stats().snapshot().closes, 1);
}

#[tokio::test]
async fn progress_reports_rows_against_the_quota() {
    let factory = ReplayFactory::new(
        LANDING_WITH_ID,
        [history_page(1, 10, &[2]), history_page(11, 10, &[1, 3])],
    );
    let request = ExtractionRequest::new("NTC", 12).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let progress = Arc::new(move |rows: usize, quota: usize| sink.lock().unwrap().push((rows, quota)));

    engine(&factory)
        .run_with(&request, progress, CancelFlag::new())
        .await;

    assert_eq!(*seen.lock().unwrap(), vec![(10, 12), (12, 12)]);
}

#[tokio::test]
async fn batch_runs_each_symbol_on_its_own_session() {
    let factory = ReplayFactory::new(
        LANDING_WITH_ID,
        [history_page(1, 5, &[2]), history_page(6, 5, &[1])],
    );
    let batch = BatchService::new(Arc::new(engine(&factory)), 2);
    let requests = vec![
        ExtractionRequest::new("NTC", 7).unwrap(),
        ExtractionRequest::new("NABIL", 3).unwrap(),
        ExtractionRequest::new("UPPER", 40).unwrap(),
    ];

    let results = batch.run_all(requests, CancelFlag::new()).await;

    let summary: Vec<(&str, &str, usize)> = results
        .iter()
        .map(|(r, o)| (r.symbol(), o.status(), o.records().len()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("NTC", "success", 7),
            ("NABIL", "success", 3),
            ("UPPER", "partial", 10)
        ]
    );

    let stats = factory.stats().snapshot();
    assert_eq!(stats.closes, 3);
    assert_eq!(stats.navigations.len(), 3);
}
