// ==========================================
// 选修课分配系统 - 命令行入口
// ==========================================
// 用法:
//   elective-allotment init
//   elective-allotment run <subject_id> [triggered_by]
//   elective-allotment allotments <subject_id> [student_id]
//   elective-allotment unallotted <subject_id>
//   elective-allotment seats <subject_id>
//   elective-allotment runs <subject_id>
//   elective-allotment window <subject_id> open|close
//   elective-allotment finalize <subject_id>
// 数据库路径: ELECTIVE_ALLOTMENT_DB_PATH 或用户数据目录
// ==========================================

use anyhow::{anyhow, bail, Context};
use elective_allotment::app::{get_default_db_path, AppState};
use elective_allotment::logging;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

const USAGE: &str = "用法: elective-allotment <init|run|allotments|unallotted|seats|runs|window|finalize> [参数...]";

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn required(arg: Option<String>, name: &str) -> anyhow::Result<String> {
    arg.map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("缺少参数 <{}>\n{}", name, USAGE))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let mut args = std::env::args().skip(1);
    let command = args.next().ok_or_else(|| anyhow!(USAGE))?;

    let db_path = get_default_db_path();
    tracing::info!("{} v{}，数据库: {}", elective_allotment::APP_NAME, elective_allotment::VERSION, db_path);
    let state = AppState::new(db_path.clone()).map_err(|e| anyhow!(e))?;

    match command.as_str() {
        "init" => {
            println!("数据库已就绪: {}", db_path);
        }
        "run" => {
            let subject_id = required(args.next(), "subject_id")?;
            let triggered_by = args.next().unwrap_or_else(|| "cli".to_string());

            let cancel = CancellationToken::new();
            let on_ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("收到中断信号，取消分配");
                    on_ctrl_c.cancel();
                }
            });

            let api = state.allotment_api.clone();
            let report = tokio::task::spawn_blocking(move || {
                api.run_allotment(&subject_id, &triggered_by, &cancel)
            })
            .await
            .context("分配任务异常退出")??;
            print_json(&report)?;
        }
        "allotments" => {
            let subject_id = required(args.next(), "subject_id")?;
            let student_id = args.next();
            let records = state
                .allotment_api
                .get_allotments(&subject_id, student_id.as_deref())?;
            print_json(&records)?;
        }
        "unallotted" => {
            let subject_id = required(args.next(), "subject_id")?;
            print_json(&state.allotment_api.list_unallotted(&subject_id)?)?;
        }
        "seats" => {
            let subject_id = required(args.next(), "subject_id")?;
            print_json(&state.allotment_api.seat_summary(&subject_id)?)?;
        }
        "runs" => {
            let subject_id = required(args.next(), "subject_id")?;
            print_json(&state.allotment_api.list_runs(&subject_id, 20)?)?;
        }
        "window" => {
            let subject_id = required(args.next(), "subject_id")?;
            let subject = match required(args.next(), "open|close")?.as_str() {
                "open" => state.allotment_api.open_preference_window(&subject_id)?,
                "close" => state.allotment_api.close_preference_window(&subject_id)?,
                other => bail!("未知窗口操作: {}\n{}", other, USAGE),
            };
            print_json(&subject)?;
        }
        "finalize" => {
            let subject_id = required(args.next(), "subject_id")?;
            print_json(&state.allotment_api.finalize(&subject_id)?)?;
        }
        other => bail!("未知命令: {}\n{}", other, USAGE),
    }

    Ok(())
}
