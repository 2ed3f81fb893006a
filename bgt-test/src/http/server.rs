//! Server tests shared by every server implementation. They expect the collection written by
//! [`write_test_collection`](crate::util::write_test_collection).
//!

use http::{HeaderValue, Method, StatusCode};

use crate::http::{Header, Response, TestRequest, TestServer};

async fn get<T: TestRequest>(tester: &impl TestServer<T>, uri: &str) -> Response {
  tester
    .test_server(tester.request().method(Method::GET).uri(uri))
    .await
}

fn assert_text(response: &Response, expected: &str) {
  println!("response body: {}", response.text());
  assert_eq!(response.status, StatusCode::OK.as_u16());
  assert_eq!(response.text(), expected);
}

/// A request without parameters gets the help page, with examples addressed to the request host.
pub async fn test_help<T: TestRequest>(tester: &impl TestServer<T>) {
  let response = tester
    .test_server(
      tester
        .request()
        .method(Method::GET)
        .uri("/")
        .insert_header(Header {
          name: http::header::HOST,
          value: HeaderValue::from_static("example.org:8000"),
        }),
    )
    .await;

  assert!(response.is_success());
  let page = response.text();
  assert!(page.starts_with("Server Configuration\n"));
  assert!(page.contains("   - panel1: population, gender\n"));
  assert!(page.contains("curl -s 'http://example.org:8000/?s="));
}

/// VCF output over the whole collection.
pub async fn test_vcf<T: TestRequest>(tester: &impl TestServer<T>) {
  let response = get(tester, "/?C").await;

  assert!(response.is_success());
  let vcf = response.text();
  assert!(vcf.starts_with("##fileformat=VCFv4.1\n"));
  assert!(vcf.contains("#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tX\tY\tZ\n"));
  assert!(vcf.contains("11\t100\t.\tA\tC\t.\t.\tAC=3;AN=6\tGT\t0|1\t0|0\t1|1\n"));
  assert_eq!(vcf.lines().filter(|line| !line.starts_with('#')).count(), 6);
}

/// Exactly `n` records are returned, followed by the truncation marker.
pub async fn test_truncation<T: TestRequest>(tester: &impl TestServer<T>) {
  assert_text(
    &get(tester, "/?t=CHROM,POS&n=2").await,
    "11\t100\n11\t250\n*\n",
  );
  assert_text(&get(tester, "/?t=POS&n=6").await, "100\n250\n151344\n160513\n200000\n5000\n");
}

/// Groups are numbered in the order they are given.
pub async fn test_group_numbering<T: TestRequest>(tester: &impl TestServer<T>) {
  assert_text(
    &get(tester, "/?t=POS,AC1,AN1,AC2,AN2&s=,Y&s=,X&r=11:100-100").await,
    "100\t0\t2\t1\t2\n",
  );
}

/// `&&` in a raw query string stays part of the expression.
pub async fn test_escaped_operators<T: TestRequest>(tester: &impl TestServer<T>) {
  assert_text(
    &get(tester, "/?t=POS&s=,X&s=,Y&f=AC1%3E0&&AC2%3E0").await,
    "250\n151344\n",
  );
  assert_text(
    &get(tester, "/?t=POS&s=,X&s=,Y&f=AC1%3E0.and.AC2%3E0").await,
    "250\n151344\n",
  );
}

/// Only samples carrying every allele are listed.
pub async fn test_matching_samples<T: TestRequest>(tester: &impl TestServer<T>) {
  assert_text(
    &get(tester, "/?a=,11:151344:1:G,11:160513::G&S").await,
    "X\t1\n",
  );
  assert_text(&get(tester, "/?a=,11:100:1:C&S").await, "X\t1\nZ\t2\n");
  assert_text(&get(tester, "/?a=,11:100:1:C&S&s=,X&q=gender==1").await, "X\t1\n");
  assert_text(&get(tester, "/?a=,11:100:1:C&S&s=,X&q=gender==2").await, "");
}

/// Parameters may be sent as a form.
pub async fn test_post<T: TestRequest>(tester: &impl TestServer<T>) {
  let response = tester
    .test_server(
      tester
        .request()
        .method(Method::POST)
        .uri("/")
        .insert_header(Header {
          name: http::header::CONTENT_TYPE,
          value: HeaderValue::from_static("application/x-www-form-urlencoded"),
        })
        .set_payload("a=,11:151344:1:G,11:160513::G&S&q=population==%22FIN%22"),
    )
    .await;

  assert_text(&response, "X\t1\n");
}

/// Samples listed from their annotations alone.
pub async fn test_listing<T: TestRequest>(tester: &impl TestServer<T>) {
  assert_text(&get(tester, "/?S").await, "X\t1\nY\t1\nZ\t2\n");
  assert_text(&get(tester, "/?q=gender==2").await, "Y\t1\nZ\t2\n");
}

/// Haplotype counts over two alleles.
pub async fn test_haplotypes<T: TestRequest>(tester: &impl TestServer<T>) {
  assert_text(
    &get(tester, "/?a=,11:100:1:C,11:250:1:A&H").await,
    "##allele1=11:100:1:C\n##allele2=11:250:1:A\n#HAP\tCOUNT\n01\t2\n10\t2\n00\t1\n11\t1\n",
  );
}

/// No allele matching `a` is not an error.
pub async fn test_no_content<T: TestRequest>(tester: &impl TestServer<T>) {
  let response = get(tester, "/?a=,11:151345:1:G").await;

  assert_eq!(response.status, StatusCode::NO_CONTENT.as_u16());
  assert!(response.body.is_empty());
}

/// Invalid parameters are rejected, naming the parameter.
pub async fn test_invalid_parameters<T: TestRequest>(tester: &impl TestServer<T>) {
  for (uri, parameter) in [
    ("/?r=11:x", "'r'"),
    ("/?r=chrUn", "'r'"),
    ("/?i=0", "'i'"),
    ("/?n=ten", "'n'"),
    ("/?t=QUAL", "'t'"),
    ("/?a=,11:1", "'a'"),
    ("/?f=AC%3E", "'f'"),
    ("/?s=,X&s=,X&s=,X&s=,X&s=,X&s=,X&s=,X&s=,X&s=,X", "'s'"),
  ] {
    let response = get(tester, uri).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST.as_u16(), "{uri}");
    assert!(response.text().starts_with("400 Bad Request: "), "{uri}");
    assert!(response.text().contains(parameter), "{uri}");
  }
}

/// Alleles on different chromosomes can't be matched together, whether or not they exist.
pub async fn test_alleles_on_two_chromosomes<T: TestRequest>(tester: &impl TestServer<T>) {
  for uri in [
    "/?a=,11:100:1:C,20:5000:1:G&S",
    "/?a=,11:151344:1:G,20:999:1:T&S",
  ] {
    let response = get(tester, uri).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST.as_u16(), "{uri}");
    assert!(response.text().contains("'a'"), "{uri}");
  }
}

/// Only paths at the root are served.
pub async fn test_not_found<T: TestRequest>(tester: &impl TestServer<T>) {
  let response = get(tester, "/variants?S").await;

  assert_eq!(response.status, StatusCode::NOT_FOUND.as_u16());
}

/// With a minimum group size of 2, genotypes are hidden and small groups are refused.
pub async fn test_minimum_group_size<T: TestRequest>(tester: &impl TestServer<T>) {
  let response = get(tester, "/?s=,X").await;
  assert_eq!(response.status, StatusCode::FORBIDDEN.as_u16());

  let response = get(tester, "/?a=,11:100:1:C&S").await;
  assert_eq!(response.status, StatusCode::FORBIDDEN.as_u16());

  let response = get(tester, "/?s=,X,Y").await;
  assert!(response.is_success());
  assert!(!response.text().contains("\tGT"));
}
