use serde_json::{json, Value as JsonValue};

use crate::{
    aggregate::{DashboardView, MapView, MerchantRow, ProjectRow, RenderPass, PLACEHOLDER_TEXT},
    utils::{escape_html, fmt_number},
};

#[derive(Debug, Clone)]
pub struct PageOptions {
    pub title: String,
    /// Token symbol for the wallet block; `None` renders the page without it.
    pub wallet_symbol: Option<String>,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self {
            title: "7 Tribes • Dashboard".to_string(),
            wallet_symbol: None,
        }
    }
}

/// JSON for a `<script type="application/json">` block; `<` is escaped so the
/// payload cannot close the element.
pub fn embed_json(v: &JsonValue) -> String {
    v.to_string().replace('<', "\\u003c")
}

/// Only `http(s)` links are rendered; anything else shows as plain text.
fn safe_href(url: &str) -> Option<&str> {
    let u = url.trim();
    let lower = u.to_ascii_lowercase();
    (lower.starts_with("https://") || lower.starts_with("http://")).then_some(u)
}

pub fn render_project_rows(rows: &[ProjectRow]) -> String {
    rows.iter()
        .map(|r| format!("<tr><td>{}</td><td>{}</td></tr>", escape_html(r.label), r.value))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_merchant_rows(rows: &[MerchantRow]) -> String {
    rows.iter()
        .map(|m| {
            let name = match m.url.as_deref().and_then(safe_href) {
                Some(url) => format!(
                    r#"<a href="{}" target="_blank" rel="noopener">{}</a>"#,
                    escape_html(url),
                    escape_html(&m.name)
                ),
                None => escape_html(&m.name),
            };
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                name,
                escape_html(&m.city),
                escape_html(&m.since),
                fmt_number(m.volume)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn popup_html(name: &str, city: &str, url: Option<&str>) -> String {
    let mut out = format!("<b>{}</b><br>{}", escape_html(name), escape_html(city));
    if let Some(u) = url.and_then(safe_href) {
        out.push_str(&format!(
            r#"<br><a href="{}" target="_blank" rel="noopener">Website</a>"#,
            escape_html(u)
        ));
    }
    out
}

fn map_payload(map: &MapView) -> JsonValue {
    let markers = map
        .markers
        .iter()
        .map(|m| {
            json!({
                "lat": m.lat,
                "lng": m.lng,
                "popup": popup_html(&m.name, &m.city, m.url.as_deref()),
            })
        })
        .collect::<Vec<_>>();
    json!({ "markers": markers, "camera": map.camera })
}

pub fn page_payload(view: &DashboardView) -> JsonValue {
    json!({
        "chart": view.chart,
        "map": view.map.as_ref().map(map_payload),
    })
}

pub fn render_page(pass: &RenderPass, opts: &PageOptions) -> String {
    // The placeholder page carries no wallet block.
    let (body, wallet) = match pass {
        RenderPass::Placeholder => (render_placeholder(), String::new()),
        RenderPass::Dashboard(view) => (
            render_dashboard(view, opts),
            opts.wallet_symbol
                .as_deref()
                .map(render_wallet_block)
                .unwrap_or_default(),
        ),
    };
    format!(
        r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>{title}</title>
    <link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css" />
    <style>
      :root {{
        --bg: #0a0a0a;
        --panel: rgba(255,255,255,0.05);
        --stroke: rgba(255,255,255,0.12);
        --text: rgba(255,255,255,0.92);
        --muted: rgba(255,255,255,0.62);
        --gold: #FFD700;
        --gold2: #b8912f;
      }}
      * {{ box-sizing: border-box; }}
      body {{
        margin: 0;
        font-family: ui-sans-serif, system-ui, -apple-system, Segoe UI, Roboto, Helvetica, Arial;
        color: var(--text);
        background: radial-gradient(1100px 800px at 15% 10%, rgba(255,215,0,0.10), transparent 60%), var(--bg);
      }}
      .wrap {{ max-width: 1200px; margin: 0 auto; padding: 22px 18px 42px; }}
      .topbar {{
        display: flex; align-items: center; justify-content: space-between; gap: 12px;
        padding: 14px 16px; border: 1px solid var(--stroke); border-radius: 16px; background: var(--panel);
      }}
      .title {{ font-weight: 800; letter-spacing: 0.2px; }}
      .subtitle {{ color: var(--muted); font-size: 12px; margin-top: 2px; display: flex; align-items: center; gap: 6px; }}
      .dot {{ width: 10px; height: 10px; border-radius: 999px; display: inline-block; background: var(--muted); }}
      .grid {{ display: grid; gap: 14px; margin-top: 14px; grid-template-columns: repeat(12, 1fr); }}
      .card {{ border: 1px solid var(--stroke); border-radius: 16px; background: var(--panel); overflow: hidden; }}
      .card .hd {{ padding: 12px 14px; border-bottom: 1px solid rgba(255,255,255,0.08); font-weight: 800; }}
      .card .bd {{ padding: 12px 14px; }}
      .kpis {{ display: grid; gap: 10px; grid-template-columns: repeat(3, 1fr); }}
      .kpi {{ border: 1px solid rgba(255,255,255,0.10); border-radius: 14px; padding: 12px; }}
      .kpi .lbl {{ color: var(--muted); font-size: 12px; }}
      .kpi .val {{ font-size: 22px; font-weight: 850; margin-top: 6px; }}
      .kpi .sub {{ color: var(--muted); font-size: 12px; margin-top: 5px; }}
      .progress {{ height: 8px; border-radius: 999px; background: rgba(255,255,255,0.07); overflow: hidden; margin-top: 8px; }}
      .bar {{ height: 100%; width: 0%; background: linear-gradient(90deg, var(--gold), var(--gold2)); }}
      table {{ width: 100%; border-collapse: collapse; }}
      th, td {{ padding: 9px 10px; border-bottom: 1px solid rgba(255,255,255,0.07); text-align: left; font-size: 13px; }}
      th {{ color: var(--muted); font-size: 12px; }}
      a {{ color: var(--gold); }}
      #map {{ height: 360px; }}
      .notice {{ color: var(--muted); font-size: 13px; display: none; }}
      .btn {{
        cursor: pointer; padding: 8px 12px; border-radius: 10px; border: 1px solid var(--stroke);
        background: rgba(255,255,255,0.05); color: var(--text); font-weight: 700; font-size: 12px;
      }}
      .wallet {{ text-align: right; font-size: 12px; color: var(--muted); }}
      .treasury-line {{ color: var(--gold); font-weight: 600; }}
      .col-12 {{ grid-column: span 12; }}
      .col-6 {{ grid-column: span 6; }}
      @media (max-width: 900px) {{
        .kpis {{ grid-template-columns: 1fr; }}
        .col-6 {{ grid-column: span 12; }}
      }}
    </style>
  </head>
  <body>
    <div class="wrap">
{body}
{wallet}
    </div>
  </body>
</html>
"#,
        title = escape_html(&opts.title),
        body = body,
        wallet = wallet,
    )
}

fn render_placeholder() -> String {
    format!(
        r#"      <div class="topbar">
        <div>
          <div class="title">Community Dashboard</div>
          <div class="subtitle">Updated: <span id="updatedAt">{}</span></div>
        </div>
      </div>"#,
        escape_html(PLACEHOLDER_TEXT)
    )
}

fn kpi(label: &str, id: &str, text: &str, sub: &str, bar: Option<(&str, u8)>) -> String {
    let bar = match bar {
        Some((bar_id, pct)) => format!(
            r#"<div class="progress"><div class="bar" id="{bar_id}" style="width: {pct}%"></div></div>"#
        ),
        None => String::new(),
    };
    format!(
        r#"          <div class="kpi">
            <div class="lbl">{label}</div>
            <div class="val" id="{id}">{text}</div>
            <div class="sub">{sub}</div>
            {bar}
          </div>"#,
        label = escape_html(label),
        text = escape_html(text),
        sub = sub,
    )
}

fn render_dashboard(view: &DashboardView, opts: &PageOptions) -> String {
    let f = &view.freshness;
    let dot_style = f
        .color
        .map(|c| format!(r#" style="background: {c}""#))
        .unwrap_or_default();
    let dot_title = f
        .title
        .as_deref()
        .map(|t| format!(r#" title="{}""#, escape_html(t)))
        .unwrap_or_default();

    let referrals_note = format!(r#"<span id="referralsNote">{}</span>"#, escape_html(view.referrals_note));
    let cities = format!("{} cities", view.merchant_stats.cities);
    let kpis = [
        kpi("Holders", "holders", &view.holders.text, "", Some(("holdersBar", view.holders.bar_pct))),
        kpi(
            "Active wallets (30d)",
            "active",
            &view.active.text,
            "",
            Some(("activeBar", view.active.bar_pct)),
        ),
        kpi(
            "Treasury (USD est)",
            "treasury",
            &view.treasury.text,
            "",
            Some(("treasuryBar", view.treasury.bar_pct)),
        ),
        kpi(
            "Spend / save (30d)",
            "spendSave",
            &view.spend.label(),
            "",
            Some(("spendBar", view.spend.spent)),
        ),
        kpi("Referrals", "referrals", &view.referrals_total, &referrals_note, None),
        kpi(
            "Merchants",
            "merchantsCount",
            &view.merchants.text,
            &escape_html(&cities),
            Some(("merchantsBar", view.merchants.bar_pct)),
        ),
    ]
    .join("\n");

    let chart_block = if view.chart.is_some() {
        r#"<canvas id="treasuryChart" height="120"></canvas>"#
    } else {
        r#"<div class="notice" style="display: block">No treasury history yet.</div>"#
    };
    let notice_style = if view.map.is_none() { r#" style="display: block""# } else { "" };

    format!(
        r##"      <div class="topbar">
        <div>
          <div class="title">{title}</div>
          <div class="subtitle"><span class="dot" id="freshDot"{dot_style}{dot_title}></span> Updated: <span id="updatedAt">{updated}</span></div>
        </div>
      </div>
      <div class="grid">
        <div class="card col-12"><div class="bd"><div class="kpis">
{kpis}
        </div></div></div>
        <div class="card col-6">
          <div class="hd">Projects</div>
          <div class="bd"><table><thead><tr><th>Stage</th><th>Count</th></tr></thead>
            <tbody id="projRows">
{projects}
            </tbody></table></div>
        </div>
        <div class="card col-6">
          <div class="hd">Treasury</div>
          <div class="bd">{chart_block}</div>
        </div>
        <div class="card col-12">
          <div class="hd">Merchants</div>
          <div class="bd"><table><thead><tr><th>Name</th><th>City</th><th>Since</th><th>Monthly volume</th></tr></thead>
            <tbody id="merchRows">
{merchants}
            </tbody></table></div>
        </div>
        <div class="card col-12">
          <div class="hd">Map</div>
          <div class="bd">
            <div class="notice" id="mapNotice"{notice_style}>No merchant geodata yet.</div>
            {map_div}
          </div>
        </div>
      </div>
      <script id="payload" type="application/json">{payload}</script>
      <script src="https://cdn.jsdelivr.net/npm/chart.js@4.4.1/dist/chart.umd.min.js"></script>
      <script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
      <script>
        (function () {{
          const data = JSON.parse(document.getElementById("payload").textContent);
          const ctx = document.getElementById("treasuryChart");
          if (ctx && data.chart && window.Chart) {{
            new Chart(ctx, {{
              type: "line",
              data: {{
                labels: data.chart.labels,
                datasets: [{{
                  label: "Treasury (USD est)",
                  data: data.chart.values,
                  tension: 0.25,
                  borderColor: "#FFD700",
                  borderWidth: 2,
                  pointRadius: 0
                }}]
              }},
              options: {{
                plugins: {{ legend: {{ display: false }} }},
                scales: {{ x: {{ grid: {{ color: "#222" }} }}, y: {{ grid: {{ color: "#222" }} }} }}
              }}
            }});
          }}
          if (data.map && window.L) {{
            try {{
              const map = L.map("map", {{ zoomControl: true, scrollWheelZoom: false }});
              L.tileLayer("https://{{s}}.tile.openstreetmap.org/{{z}}/{{x}}/{{y}}.png", {{
                attribution: "© OpenStreetMap"
              }}).addTo(map);
              for (const m of data.map.markers) {{
                L.marker([m.lat, m.lng]).addTo(map).bindPopup(m.popup);
              }}
              const cam = data.map.camera;
              if (cam.kind === "center") {{
                map.setView([cam.lat, cam.lng], cam.zoom);
              }} else {{
                map.fitBounds(cam.bounds, {{ padding: cam.padding }});
              }}
            }} catch (e) {{
              console.warn("map init failed", e);
            }}
          }}
        }})();
      </script>"##,
        title = escape_html(&opts.title),
        dot_style = dot_style,
        dot_title = dot_title,
        updated = escape_html(&f.updated_text),
        kpis = kpis,
        projects = render_project_rows(&view.projects),
        chart_block = chart_block,
        merchants = render_merchant_rows(&view.merchant_rows),
        notice_style = notice_style,
        map_div = if view.map.is_some() { r#"<div id="map"></div>"# } else { "" },
        payload = embed_json(&page_payload(view)),
    )
}

fn render_wallet_block(symbol: &str) -> String {
    format!(
        r#"      <div class="card" style="margin-top: 14px">
        <div class="bd wallet">
          <button class="btn" id="connectBtn">Connect Wallet</button>
          <div id="walletBalance"></div>
        </div>
      </div>
      <script>
        (function () {{
          const btn = document.getElementById("connectBtn");
          const out = document.getElementById("walletBalance");
          const symbol = {symbol};
          function short(a) {{ return a ? a.slice(0, 6) + "..." + a.slice(-4) : "—"; }}
          async function show(account) {{
            btn.textContent = short(account);
            out.textContent = "Loading " + symbol + " balance…";
            try {{
              const r = await fetch("/api/balance/" + encodeURIComponent(account), {{ cache: "no-store" }});
              const j = await r.json();
              if (!r.ok || !j.ok) throw new Error(j.error || ("HTTP " + r.status));
              out.innerHTML = "";
              j.lines.forEach((line, i) => {{
                const div = document.createElement("div");
                div.textContent = line;
                if (i === j.lines.length - 1) div.className = "treasury-line";
                out.appendChild(div);
              }});
            }} catch (e) {{
              out.textContent = "Balance lookup failed.";
              console.error(e);
            }}
          }}
          function reset() {{ btn.textContent = "Connect Wallet"; out.textContent = ""; }}
          btn.addEventListener("click", async () => {{
            if (!window.ethereum) {{
              alert("No wallet found. Open this page in MetaMask or a Web3 browser.");
              return;
            }}
            try {{
              const accounts = await window.ethereum.request({{ method: "eth_requestAccounts" }});
              if (accounts.length) show(accounts[0]);
            }} catch (e) {{
              console.error(e);
              alert("Wallet connection failed.");
            }}
          }});
          if (window.ethereum) {{
            window.ethereum.request({{ method: "eth_accounts" }}).then((a) => {{ if (a.length) show(a[0]); }}).catch(() => {{}});
            window.ethereum.on && window.ethereum.on("accountsChanged", (a) => {{ a.length ? show(a[0]) : reset(); }});
          }}
        }})();
      </script>"#,
        symbol = embed_json(&JsonValue::from(symbol)),
    )
}
