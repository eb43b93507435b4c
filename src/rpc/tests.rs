#[cfg(test)]
#[allow(clippy::unwrap_used)]
#[allow(clippy::expect_used)]
mod unit_tests {
    use super::super::*;
    use serde_json::json;

    fn trace_block_response() -> serde_json::Value {
        json!({
            "jsonrpc": "2.0",
            "id": 7,
            "result": [
                {
                    "action": {
                        "callType": "call",
                        "from": "0x742d35cc6634c0532925a3b844bc454e4438f44e",
                        "to": "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2",
                        "gas": "0x5208",
                        "input": "0x",
                        "value": "0x0"
                    },
                    "blockHash": "0x4e3a3754410177e6937ef1f84bba68ea139e8d1a2258c5f85db9f1cd715a1bdd",
                    "blockNumber": 46147,
                    "result": { "gasUsed": "0x0", "output": "0x" },
                    "subtraces": 0,
                    "traceAddress": [],
                    "transactionHash": "0x5c504ed432cb51138bcf09aa5e8a410dd4a1e204ef84bfed1be16dfba1b22060",
                    "transactionPosition": 0,
                    "type": "call"
                },
                {
                    "action": {
                        "author": "0xe6a7a1d47ff21b6321162aea7c6cb457d5476bca",
                        "rewardType": "block",
                        "value": "0x4563918244f40000"
                    },
                    "blockHash": "0x4e3a3754410177e6937ef1f84bba68ea139e8d1a2258c5f85db9f1cd715a1bdd",
                    "blockNumber": 46147,
                    "result": null,
                    "subtraces": 0,
                    "traceAddress": [],
                    "type": "reward"
                }
            ]
        })
    }

    #[test]
    fn test_trace_block_response_deserializes() {
        let response: RpcResponse<Vec<Trace>> =
            serde_json::from_value(trace_block_response()).unwrap();
        let traces = response.result.unwrap();

        assert_eq!(traces.len(), 2);
        assert_eq!(traces[0].transaction_position, Some(0));
        assert!(traces[0].is_top_level());
        assert_eq!(traces[0].output(), Some("0x"));
        assert!(traces[1].result.is_none());
        assert!(traces[1].transaction_position.is_none());
    }

    #[test]
    fn test_trace_entry_classification() {
        let response: RpcResponse<Vec<Trace>> =
            serde_json::from_value(trace_block_response()).unwrap();
        let traces = response.result.unwrap();

        assert!(matches!(
            traces[0].entry().unwrap(),
            TraceEntry::Call {
                from: Some("0x742d35cc6634c0532925a3b844bc454e4438f44e"),
                ..
            }
        ));
        assert!(matches!(
            traces[1].entry().unwrap(),
            TraceEntry::Reward {
                reward_type: Some(RewardType::Block),
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_trace_type_is_an_error() {
        let mut value = trace_block_response();
        value["result"][0]["type"] = json!("staticcall-v2");
        let response: RpcResponse<Vec<Trace>> = serde_json::from_value(value).unwrap();
        let traces = response.result.unwrap();

        let err = traces[0].entry().unwrap_err();
        assert!(matches!(
            err,
            IndexError::UnknownTraceType {
                block_number: 46147,
                ..
            }
        ));
    }

    #[test]
    fn test_error_object_deserializes() {
        let response: RpcResponse<Vec<Trace>> = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32601, "message": "the method trace_block does not exist" }
        }))
        .unwrap();

        assert!(response.result.is_none());
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[test]
    fn test_log_tx_index_parses_hex() {
        let log: Log = serde_json::from_value(json!({
            "address": "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2",
            "topics": [],
            "data": "0x",
            "transactionIndex": "0x1f"
        }))
        .unwrap();

        assert_eq!(log.tx_index().unwrap().value(), 31);
    }

    #[test]
    fn test_log_filter_serializes_single_block() {
        let filter = LogFilter::single_block(BlockNumber::from_trusted(255));
        let value = serde_json::to_value((filter,)).unwrap();
        assert_eq!(value, json!([{ "fromBlock": "0xff", "toBlock": "0xff" }]));
    }

    #[test]
    fn test_request_ids_are_monotonic() {
        let client = EthereumJsonRpcClient::new("http://127.0.0.1:1".to_string(), 0);
        let first = client.next_request_id();
        let second = client.next_request_id();
        assert!(second > first);
    }

    #[test]
    fn test_request_ids_are_per_client() {
        let a = EthereumJsonRpcClient::new("http://127.0.0.1:1".to_string(), 0);
        let b = EthereumJsonRpcClient::new("http://127.0.0.1:1".to_string(), 0);
        a.next_request_id();
        a.next_request_id();
        assert_eq!(b.next_request_id(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_node_is_a_transport_error() {
        let client = EthereumJsonRpcClient::new("http://127.0.0.1:1".to_string(), 0);
        let err = client.get_latest_block_number().await.unwrap_err();
        assert!(err.is_transport(), "unexpected error: {err}");
    }
}
