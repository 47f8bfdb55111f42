//! Integration tests for request document conversion.

use jsonapi_core::{
    DocumentAdapter, Options, RelationshipValue, RequestContext, RequestError, RequestModel,
    ResourceGraph, ResourceIdentity, WriteOperationKind,
};
use serde_json::json;

fn graph() -> ResourceGraph {
    ResourceGraph::from_definition(&json!({
        "resources": [
            {
                "type": "people",
                "idType": "integer",
                "attributes": [
                    { "name": "firstName", "type": "string", "nullable": true },
                    { "name": "lastName", "type": "string", "required": true }
                ],
                "relationships": [
                    { "name": "ownedTodoItems", "kind": "toMany", "target": "todoItems" }
                ]
            },
            {
                "type": "todoItems",
                "idType": "integer",
                "attributes": [
                    { "name": "description", "type": "string" },
                    { "name": "priority", "type": { "enum": ["low", "medium", "high"] } },
                    { "name": "durationInHours", "type": "integer", "nullable": true }
                ],
                "relationships": [
                    { "name": "owner", "kind": "toOne", "target": "people" },
                    { "name": "assignee", "kind": "toOne", "target": "people" },
                    { "name": "tags", "kind": "toMany", "target": "tags" }
                ]
            },
            {
                "type": "tags",
                "idType": "integer",
                "attributes": [{ "name": "name", "type": "string" }]
            }
        ]
    }))
    .unwrap()
}

fn convert(body: serde_json::Value, ctx: &RequestContext) -> Result<RequestModel, RequestError> {
    convert_with(body, ctx, &Options::default())
}

fn convert_with(
    body: serde_json::Value,
    ctx: &RequestContext,
    options: &Options,
) -> Result<RequestModel, RequestError> {
    let graph = graph();
    DocumentAdapter::new(&graph, options).convert_body(&body.to_string(), ctx)
}

mod primary_endpoint {
    use super::*;

    #[test]
    fn type_after_attributes_reads_the_same() {
        let ctx = RequestContext::create("todoItems");
        let type_first = convert(
            json!({ "data": { "type": "todoItems", "attributes": { "description": "Walk" } } }),
            &ctx,
        )
        .unwrap();
        let body = r#"{"data": {"attributes": {"description": "Walk"}, "type": "todoItems"}}"#;
        let graph = graph();
        let options = Options::default();
        let type_last = DocumentAdapter::new(&graph, &options)
            .convert_body(body, &ctx)
            .unwrap();
        assert_eq!(type_first, type_last);
    }

    #[test]
    fn wrong_attribute_kinds_are_all_reported() {
        let err = convert(
            json!({
                "data": {
                    "type": "todoItems",
                    "attributes": {
                        "durationInHours": "long",
                        "priority": "urgent"
                    }
                }
            }),
            &RequestContext::create("todoItems"),
        )
        .unwrap_err();

        assert_eq!(err.status(), 422);
        let errors = err.errors();
        let pointers: Vec<_> = errors.iter().map(|e| e.pointer.as_deref()).collect();
        assert_eq!(
            pointers,
            vec![
                Some("/data/attributes/durationInHours"),
                Some("/data/attributes/priority")
            ]
        );
        let first = errors[0].to_error_object();
        assert_eq!(first.title, "Incompatible attribute value found.");
        assert!(first.detail.unwrap().contains("'durationInHours' with value 'long'"));
    }

    #[test]
    fn first_error_only_without_model_validation() {
        let err = convert_with(
            json!({
                "data": {
                    "type": "todoItems",
                    "attributes": { "durationInHours": "long", "priority": "urgent" }
                }
            }),
            &RequestContext::create("todoItems"),
            &Options::default().validate_model_state(false),
        )
        .unwrap_err();
        assert_eq!(err.errors().len(), 1);
    }

    #[test]
    fn required_attribute_missing_on_create() {
        let err = convert(
            json!({ "data": { "type": "people", "attributes": { "firstName": "Ada" } } }),
            &RequestContext::create("people"),
        )
        .unwrap_err();
        let error = &err.errors()[0];
        assert_eq!(error.status(), 422);
        assert_eq!(error.pointer.as_deref(), Some("/data/attributes/lastName"));
    }

    #[test]
    fn type_mismatch_with_endpoint() {
        let err = convert(
            json!({ "data": { "type": "people", "id": "1", "attributes": {} } }),
            &RequestContext::update("todoItems", "1"),
        )
        .unwrap_err();
        assert_eq!(err.status(), 409);
        let error = err.errors()[0].to_error_object();
        assert_eq!(
            error.title,
            "Resource type mismatch between request body and endpoint URL '/todoItems/1'."
        );
        assert_eq!(error.source.unwrap().pointer.as_deref(), Some("/data/type"));
    }

    #[test]
    fn client_generated_id_is_forbidden_by_default() {
        let body = json!({ "data": { "type": "tags", "id": "5", "attributes": { "name": "x" } } });
        let err = convert(body.clone(), &RequestContext::create("tags")).unwrap_err();
        assert_eq!(err.status(), 403);

        let model = convert_with(
            body,
            &RequestContext::create("tags"),
            &Options::default().allow_client_generated_ids(true),
        )
        .unwrap();
        let RequestModel::Resource(intent) = model else {
            panic!("expected a resource request");
        };
        assert_eq!(intent.resource.id.as_deref(), Some("5"));
    }

    #[test]
    fn malformed_json_is_a_client_error() {
        let graph = graph();
        let options = Options::default();
        let err = DocumentAdapter::new(&graph, &options)
            .convert_body("{\"data\": ", &RequestContext::create("tags"))
            .unwrap_err();
        assert_eq!(err.status(), 400);
        assert_eq!(
            err.errors()[0].to_error_object().title,
            "Failed to deserialize request body."
        );
    }

    #[test]
    fn relationship_target_type_is_checked() {
        let err = convert(
            json!({
                "data": {
                    "type": "todoItems",
                    "relationships": {
                        "owner": { "data": { "type": "tags", "id": "1" } }
                    }
                }
            }),
            &RequestContext::create("todoItems"),
        )
        .unwrap_err();
        assert_eq!(err.status(), 409);
        assert_eq!(
            err.errors()[0].pointer.as_deref(),
            Some("/data/relationships/owner/data/type")
        );
    }
}

mod relationship_endpoint {
    use super::*;

    #[test]
    fn set_to_many() {
        let model = convert(
            json!({ "data": [{ "type": "tags", "id": "1" }, { "type": "tags", "id": "2" }] }),
            &RequestContext::relationship(
                "todoItems",
                "7",
                "tags",
                WriteOperationKind::SetRelationship,
            ),
        )
        .unwrap();
        let RequestModel::Relationship(intent) = model else {
            panic!("expected a relationship request");
        };
        assert_eq!(intent.resource.id.as_deref(), Some("7"));
        assert_eq!(
            intent.relationship_value(),
            Some(&RelationshipValue::ToMany(vec![
                ResourceIdentity::with_id("tags", "1"),
                ResourceIdentity::with_id("tags", "2"),
            ]))
        );
    }

    #[test]
    fn null_clears_to_one() {
        let model = convert(
            json!({ "data": null }),
            &RequestContext::relationship(
                "todoItems",
                "7",
                "assignee",
                WriteOperationKind::SetRelationship,
            ),
        )
        .unwrap();
        assert_eq!(
            model.into_intents()[0].relationship_value(),
            Some(&RelationshipValue::ToOne(None))
        );
    }

    #[test]
    fn null_elements_in_to_many_are_rejected() {
        let err = convert(
            json!({ "data": [{ "type": "tags", "id": "1" }, null] }),
            &RequestContext::relationship(
                "todoItems",
                "7",
                "tags",
                WriteOperationKind::AddToRelationship,
            ),
        )
        .unwrap_err();
        assert_eq!(err.errors()[0].pointer.as_deref(), Some("/data[1]"));
    }
}

mod atomic_operations {
    use super::*;

    fn ops(operations: serde_json::Value) -> Result<RequestModel, RequestError> {
        convert(
            json!({ "atomic:operations": operations }),
            &RequestContext::operations(),
        )
    }

    #[test]
    fn kinds_follow_op_and_ref() {
        let model = ops(json!([
            { "op": "add", "data": { "type": "people", "lid": "p", "attributes": { "lastName": "L" } } },
            { "op": "update", "data": { "type": "people", "lid": "p", "attributes": { "firstName": "F" } } },
            {
                "op": "update",
                "ref": { "type": "todoItems", "id": "1", "relationship": "owner" },
                "data": { "type": "people", "lid": "p" }
            },
            {
                "op": "add",
                "ref": { "type": "todoItems", "id": "1", "relationship": "tags" },
                "data": [{ "type": "tags", "id": "3" }]
            },
            {
                "op": "remove",
                "ref": { "type": "todoItems", "id": "1", "relationship": "tags" },
                "data": [{ "type": "tags", "id": "3" }]
            },
            { "op": "remove", "ref": { "type": "people", "lid": "p" } }
        ]))
        .unwrap();

        let kinds: Vec<_> = model.into_intents().iter().map(|i| i.kind).collect();
        assert_eq!(
            kinds,
            vec![
                WriteOperationKind::CreateResource,
                WriteOperationKind::UpdateResource,
                WriteOperationKind::SetRelationship,
                WriteOperationKind::AddToRelationship,
                WriteOperationKind::RemoveFromRelationship,
                WriteOperationKind::DeleteResource,
            ]
        );
    }

    #[test]
    fn pointers_are_rooted_at_the_operation() {
        let err = ops(json!([
            { "op": "add", "data": { "type": "tags", "attributes": { "name": "a" } } },
            { "op": "add", "data": { "type": "todoItems", "attributes": { "durationInHours": "x" } } }
        ]))
        .unwrap_err();
        assert_eq!(
            err.errors()[0].pointer.as_deref(),
            Some("/atomic:operations[1]/data/attributes/durationInHours")
        );
    }

    #[test]
    fn duplicate_local_id() {
        let err = ops(json!([
            { "op": "add", "data": { "type": "tags", "lid": "t", "attributes": { "name": "a" } } },
            { "op": "add", "data": { "type": "tags", "lid": "t", "attributes": { "name": "b" } } }
        ]))
        .unwrap_err();
        let error = err.errors()[0].to_error_object();
        assert_eq!(error.status, "400");
        assert_eq!(
            error.title,
            "Another local ID with the same name is already defined at this point."
        );
        assert_eq!(
            error.source.unwrap().pointer.as_deref(),
            Some("/atomic:operations[1]")
        );
    }

    #[test]
    fn forward_reference_to_local_id() {
        let err = ops(json!([
            {
                "op": "add",
                "data": {
                    "type": "todoItems",
                    "relationships": { "owner": { "data": { "type": "people", "lid": "later" } } }
                }
            },
            { "op": "add", "data": { "type": "people", "lid": "later", "attributes": { "lastName": "L" } } }
        ]))
        .unwrap_err();
        let error = err.errors()[0].to_error_object();
        assert_eq!(
            error.title,
            "Server-generated value for local ID is not available at this point."
        );
        assert_eq!(
            error.source.unwrap().pointer.as_deref(),
            Some("/atomic:operations[0]")
        );
    }

    #[test]
    fn local_id_used_with_wrong_type() {
        let err = ops(json!([
            { "op": "add", "data": { "type": "tags", "lid": "x", "attributes": { "name": "a" } } },
            {
                "op": "add",
                "data": {
                    "type": "todoItems",
                    "relationships": { "owner": { "data": { "type": "people", "lid": "x" } } }
                }
            }
        ]))
        .unwrap_err();
        assert_eq!(
            err.errors()[0].to_error_object().title,
            "Incompatible type in Local ID usage."
        );
    }

    #[test]
    fn batch_errors_are_reported_together() {
        let err = ops(json!([
            { "op": "add", "data": { "type": "todoItems", "attributes": { "durationInHours": "x" } } },
            { "op": "add", "data": { "type": "todoItems", "attributes": { "durationInHours": "y" } } },
            {
                "op": "update",
                "data": { "type": "people", "lid": "nope", "attributes": { "lastName": "L" } }
            }
        ]))
        .unwrap_err();

        let errors = err.errors();
        let pointers: Vec<Option<&str>> = errors.iter().map(|e| e.pointer.as_deref()).collect();
        assert_eq!(
            pointers,
            vec![
                Some("/atomic:operations[0]/data/attributes/durationInHours"),
                Some("/atomic:operations[1]/data/attributes/durationInHours"),
                Some("/atomic:operations[2]"),
            ]
        );
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn structural_failure_keeps_other_operation_errors() {
        let err = ops(json!([
            { "op": "add", "data": { "type": "todoItems", "attributes": { "durationInHours": "x" } } },
            { "op": "upsert", "data": { "type": "tags" } }
        ]))
        .unwrap_err();

        let errors = err.errors();
        let pointers: Vec<Option<&str>> = errors.iter().map(|e| e.pointer.as_deref()).collect();
        assert_eq!(
            pointers,
            vec![
                Some("/atomic:operations[0]/data/attributes/durationInHours"),
                Some("/atomic:operations[1]/op"),
            ]
        );
    }

    #[test]
    fn first_error_only_without_model_state_validation() {
        let err = convert_with(
            json!({ "atomic:operations": [
                { "op": "add", "data": { "type": "todoItems", "attributes": { "durationInHours": "x" } } },
                { "op": "update", "data": { "type": "people", "lid": "nope" } }
            ] }),
            &RequestContext::operations(),
            &Options::default().validate_model_state(false),
        )
        .unwrap_err();
        assert_eq!(err.errors().len(), 1);
        assert_eq!(
            err.errors()[0].pointer.as_deref(),
            Some("/atomic:operations[0]/data/attributes/durationInHours")
        );
    }

    #[test]
    fn too_many_operations() {
        let operation = json!({ "op": "remove", "ref": { "type": "tags", "id": "1" } });
        let err = convert_with(
            json!({ "atomic:operations": vec![operation; 3] }),
            &RequestContext::operations(),
            &Options::default().max_operations_per_request(Some(2)),
        )
        .unwrap_err();
        assert_eq!(err.status(), 413);
        assert_eq!(err.errors()[0].pointer.as_deref(), Some("/atomic:operations"));
    }

    #[test]
    fn empty_batch() {
        let err = ops(json!([])).unwrap_err();
        assert_eq!(err.errors()[0].to_error_object().title, "No operations found.");
    }

    #[test]
    fn data_is_forbidden_on_operations_endpoint() {
        let err = convert(
            json!({ "data": { "type": "tags" } }),
            &RequestContext::operations(),
        )
        .unwrap_err();
        assert_eq!(err.errors()[0].pointer.as_deref(), Some("/data"));
    }

    #[test]
    fn unknown_op_code() {
        let err = ops(json!([{ "op": "upsert", "data": { "type": "tags" } }])).unwrap_err();
        assert_eq!(
            err.errors()[0].pointer.as_deref(),
            Some("/atomic:operations[0]/op")
        );
    }
}
